//! Parsers for recisdb's diagnostic and signal output.
//!
//! recisdb reports failures on stderr as lines matching `ERROR: <message>`
//! and reports reception quality on stdout as carriage-return separated
//! values like `30.00dB`.

use nom::bytes::complete::tag;
use nom::character::complete::{multispace1, not_line_ending};
use nom::combinator::verify;
use nom::number::complete::double;
use nom::IResult;

/// recisdb error messages that mean the device itself could not be opened,
/// as opposed to a per-channel tuning failure.
const OPENING_FAILURE_MESSAGES: &[&str] = &[
    "The tuner device does not exist.",
    "The tuner device is already in use.",
    "The tuner device is busy.",
    "The tuner device does not support the ioctl system call.",
];

fn helper_error(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag("ERROR:")(input)?;
    let (input, _) = multispace1(input)?;
    verify(not_line_ending, |message: &str| !message.trim().is_empty())(input)
}

/// Extract the first `ERROR: <message>` occurrence from stderr output.
pub(crate) fn parse_helper_error(stderr_text: &str) -> Option<String> {
    for (index, _) in stderr_text.char_indices() {
        if let Ok((_, message)) = helper_error(&stderr_text[index..]) {
            return Some(message.trim_end().to_string());
        }
    }
    None
}

/// Classify an error message as a device-open failure.
pub(crate) fn is_opening_failure(message: &str) -> bool {
    OPENING_FAILURE_MESSAGES.contains(&message) || message.starts_with("Cannot open the device.")
}

fn signal_level(input: &str) -> IResult<&str, f64> {
    let (input, value) = double(input)?;
    let (input, _) = tag("dB")(input)?;
    Ok((input, value))
}

/// Extract a C/N reading in dB from one checksignal output line.
pub(crate) fn parse_signal_level(line: &str) -> Option<f64> {
    for (index, _) in line.char_indices() {
        if let Ok((_, value)) = signal_level(&line[index..]) {
            return Some(value);
        }
    }
    None
}
