//! Command handlers
//!
//! Each handler turns parsed arguments into library calls and writes the
//! result to stdout.

use std::io::Write;

use anyhow::Context;
use sendify_http::config::{RateLimitSettings, RetrySettings};
use sendify_http::http::middleware::{LoggingMiddleware, RequestIdMiddleware};
use sendify_http::http::redact::{LogBodyConfig, RedactionPolicy};
use sendify_http::http::Method;
use sendify_http::{ClientConfig, HttpError, RequestContext, Response};

use crate::cli::RequestArgs;
use crate::error::{Error, Result};

/// How much the handler prints besides the body
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub quiet: bool,
    pub verbosity: u8,
}

/// Handle the request command
pub async fn handle_request(
    args: RequestArgs,
    config: ClientConfig,
    options: OutputOptions,
) -> Result<()> {
    let config = config.merge(overrides(&args)?);
    let mut logging = LoggingMiddleware::new(RedactionPolicy::default());
    if options.verbosity >= 2 {
        logging = logging.with_body_logging(LogBodyConfig::default());
    }
    let client = config
        .into_builder()?
        .middleware(RequestIdMiddleware::new())
        .middleware(logging)
        .build()?;

    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::invalid_args(format!("invalid HTTP method '{}'", args.method)))?;
    let mut request = client.request(method, args.path.as_str());
    for header in &args.headers {
        let (name, value) = parse_header(header).map_err(|e| Error::invalid_args(e.to_string()))?;
        request = request.header(name, value);
    }
    for pair in &args.query {
        let (name, value) = parse_query(pair).map_err(|e| Error::invalid_args(e.to_string()))?;
        request = request.query(name, value);
    }
    if let Some(data) = args.data {
        request = if args.json {
            let value: serde_json::Value = serde_json::from_str(&data)?;
            request.json(value)
        } else {
            request.body(data)
        };
    }

    let ctx = RequestContext::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling request");
            interrupt.cancel();
        }
    });

    match request.send(&ctx).await {
        Ok(response) => {
            print_response(&response, args.json, options)?;
            Ok(())
        }
        Err(err) => {
            print_failed_response(&err, args.json, options)?;
            Err(err.into())
        }
    }
}

/// Client settings given on the command line
fn overrides(args: &RequestArgs) -> Result<ClientConfig> {
    let rate_limit = args
        .rate_limit
        .as_deref()
        .map(RateLimitSettings::parse)
        .transpose()?;
    let retry = args.retries.map(|attempts| RetrySettings {
        max_attempts: Some(attempts),
        ..Default::default()
    });

    Ok(ClientConfig {
        base_url: args.base_url.clone(),
        timeout_ms: args.timeout_ms,
        retry,
        rate_limit,
        ..Default::default()
    })
}

/// Split `Name: value`
fn parse_header(raw: &str) -> anyhow::Result<(&str, &str)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header '{raw}' must look like 'Name: value'"))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("header '{raw}' has an empty name");
    }
    Ok((name, value.trim()))
}

/// Split `key=value`
fn parse_query(raw: &str) -> anyhow::Result<(&str, &str)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("query parameter '{raw}' must look like key=value"))?;
    if name.is_empty() {
        anyhow::bail!("query parameter '{raw}' has an empty key");
    }
    Ok((name, value))
}

fn print_response(response: &Response, json: bool, options: OutputOptions) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if !options.quiet {
        writeln!(stdout, "{}", response.status_text())?;
        if response.attempts() > 1 {
            writeln!(stdout, "attempts: {}", response.attempts())?;
        }
    }
    write_body(&mut stdout, response.body(), json)?;
    Ok(())
}

fn print_failed_response(err: &HttpError, json: bool, options: OutputOptions) -> Result<()> {
    match err.response() {
        Some(response) => print_response(response, json, options),
        None => Ok(()),
    }
}

fn write_body(out: &mut impl Write, body: &[u8], json: bool) -> Result<()> {
    if body.is_empty() {
        return Ok(());
    }
    if json {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
            return Ok(());
        }
    }
    out.write_all(body)?;
    if !body.ends_with(b"\n") {
        writeln!(out)?;
    }
    Ok(())
}
