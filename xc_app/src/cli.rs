use std::path::PathBuf;

use anyhow::Context;
use anyhow::bail;
use serde_json::Value;
use xc_http::Method;

pub const USAGE: &str = "usage: xc_request [--config <file.toml>] <METHOD> <PATH> [JSON_BODY]";

/// A single request described on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct RequestArgs {
    pub config: Option<PathBuf>,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Parses `[--config <file>] <METHOD> <PATH> [JSON_BODY]` (program name excluded)
pub fn parse_request_args<I>(args: I) -> anyhow::Result<RequestArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().context("--config needs a file path")?;
            config = Some(PathBuf::from(path));
        } else {
            positional.push(arg);
        }
    }

    let mut positional = positional.into_iter();
    let (Some(method), Some(path)) = (positional.next(), positional.next()) else {
        bail!("{USAGE}");
    };

    let method = Method::from_bytes(method.to_uppercase().as_bytes()).with_context(|| format!("invalid HTTP method {method:?}"))?;

    if !path.starts_with('/') {
        bail!("path must start with '/', got {path:?}");
    }

    let body = positional.next().map(|raw| serde_json::from_str::<Value>(&raw).context("body is not valid JSON")).transpose()?;

    if positional.next().is_some() {
        bail!("{USAGE}");
    }

    Ok(RequestArgs { config, method, path, body })
}
