use std::fs::File;
use std::io::Read;

use rpcframe_frame::FrameReader;
use tracing::debug;

use crate::cmd::InspectArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_frame, print_frame_table, FrameRecord, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.limits.decoder_config()?.frame_config();
    let input: Box<dyn Read> = if args.input.as_os_str() == "-" {
        Box::new(std::io::stdin().lock())
    } else {
        let file = File::open(&args.input).map_err(|err| {
            io_error(&format!("failed opening {}", args.input.display()), &err)
        })?;
        Box::new(file)
    };

    let mut reader = FrameReader::with_config(input, config);
    let mut records = Vec::new();
    let mut offset = 0;
    let result = loop {
        match reader.read_frame() {
            Ok(Some((frame, size))) => {
                let record = FrameRecord::new(offset, &frame, size);
                print_frame(&record, &frame, format);
                records.push(record);
                offset += size;
            }
            Ok(None) => break Ok(()),
            Err(err) => {
                debug!(pending = reader.pending_bytes(), "inspect stopped on invalid frame");
                break Err(err);
            }
        }
    };

    if matches!(format, OutputFormat::Table) {
        print_frame_table(&records);
    }
    debug!(frames = records.len(), bytes = offset, "inspect finished");

    result.map_err(|err| frame_error(&format!("invalid frame at offset {offset}"), &err))?;
    Ok(SUCCESS)
}
