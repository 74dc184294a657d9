use std::time::SystemTime;

use imlink_engine::{HandshakeParams, StaticAuth};
use serde::Serialize;

use crate::cmd::SignArgs;
use crate::exit::{auth_error, CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

#[derive(Serialize)]
struct SignOutput {
    trace_id: String,
    timestamp: u64,
    sign: String,
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

pub fn run(args: SignArgs, format: OutputFormat) -> CliResult<i32> {
    let params = params(&args)?;
    let out = SignOutput {
        trace_id: params.trace_id.clone(),
        timestamp: params.timestamp,
        sign: params.sign.clone(),
        query: params.query(),
        url: args.url.as_deref().map(|base| params.channel_url(base)),
    };

    let mut fields = vec![
        ("trace_id", out.trace_id.clone()),
        ("timestamp", out.timestamp.to_string()),
        ("sign", out.sign.clone()),
        ("query", out.query.clone()),
    ];
    if let Some(url) = &out.url {
        fields.push(("url", url.clone()));
    }
    print_fields(&out, &fields, format);
    Ok(SUCCESS)
}

fn params(args: &SignArgs) -> CliResult<HandshakeParams> {
    let generated = HandshakeParams::generate(
        &StaticAuth::new(args.token.clone(), args.secret.clone()),
        SystemTime::now(),
    )
    .map_err(|err| auth_error("sign failed", err))?;

    if args.trace_id.is_none() && args.timestamp.is_none() {
        return Ok(generated);
    }
    HandshakeParams::new(
        args.trace_id.clone().unwrap_or(generated.trace_id),
        args.timestamp.unwrap_or(generated.timestamp),
        &args.secret,
        args.token.clone(),
    )
    .map_err(|err| auth_error("sign failed", err))
}
