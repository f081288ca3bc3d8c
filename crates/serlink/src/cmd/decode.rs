use serlink_frame::{FrameConfig, FrameDecoder};

use crate::cmd::parse::parse_hex;
use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_decoded, DecodedFrame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = match (&args.hex, &args.file) {
        (Some(hex), _) => parse_hex(hex)?,
        (None, Some(path)) => std::fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        (None, None) => return Err(CliError::usage("pass wire bytes as HEX or --file")),
    };

    let frames = decode(&bytes, args.max_frame_size);
    print_decoded(&frames, format);

    if frames.iter().any(|f| f.error.is_some()) {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

/// Run `bytes` through a fresh decoder and describe every frame boundary.
pub fn decode(bytes: &[u8], max_frame_size: usize) -> Vec<DecodedFrame> {
    let config = FrameConfig {
        max_frame_size,
        ..FrameConfig::default()
    };
    FrameDecoder::new(&config)
        .push_slice(bytes)
        .iter()
        .enumerate()
        .map(|(i, result)| DecodedFrame::from_result(i, result))
        .collect()
}
