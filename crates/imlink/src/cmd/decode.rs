use std::fs;
use std::io::{Cursor, Read};

use imlink_frame::{FrameConfig, FrameReader};
use imlink_proto::{decode_envelope, Envelope};

use crate::cmd::{DecodeArgs, Encoding};
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_envelopes, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let decoded = match args.encoding {
        Encoding::Raw => decode_all(open_input(&args)?, args.max_payload)?,
        Encoding::Hex => {
            let mut text = Vec::new();
            open_input(&args)?
                .read_to_end(&mut text)
                .map_err(|err| io_error("failed reading input", err))?;
            decode_all(Cursor::new(parse_hex(&text)?), args.max_payload)?
        }
    };
    print_envelopes(&decoded.envelopes, format);

    if decoded.rejected > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{} of {} frames did not decode", decoded.rejected, decoded.frames),
        ));
    }
    Ok(SUCCESS)
}

fn open_input(args: &DecodeArgs) -> CliResult<Box<dyn Read>> {
    match &args.input {
        Some(path) if path.as_os_str() != "-" => fs::File::open(path)
            .map(|file| Box::new(file) as Box<dyn Read>)
            .map_err(|err| io_error(&format!("failed opening {}", path.display()), err)),
        _ => Ok(Box::new(std::io::stdin().lock())),
    }
}

/// Hex text with any whitespace between digits.
fn parse_hex(input: &[u8]) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    hex::decode(digits).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex input: {err}")))
}

#[derive(Debug)]
struct Decoded {
    envelopes: Vec<Envelope>,
    frames: usize,
    rejected: usize,
}

fn decode_all<R: Read>(source: R, max_payload: usize) -> CliResult<Decoded> {
    let reader = FrameReader::with_config(
        source,
        FrameConfig {
            max_payload_size: max_payload,
        },
    );

    let mut decoded = Decoded {
        envelopes: Vec::new(),
        frames: 0,
        rejected: 0,
    };
    for payload in reader {
        let payload = payload.map_err(|err| frame_error("decode failed", err))?;
        match decode_envelope(&payload) {
            Ok(envelope) => decoded.envelopes.push(envelope),
            Err(err) => {
                tracing::warn!(frame = decoded.frames, error = %err, "frame skipped");
                decoded.rejected += 1;
            }
        }
        decoded.frames += 1;
    }
    Ok(decoded)
}
