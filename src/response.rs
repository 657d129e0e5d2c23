//! Classification and decoding of device acknowledgement frames.

use crate::cmd::{DELIM_CR, ERR_BEG, SUCC_BEG, SUCC_FRAME};
use crate::error::{PtuError, PtuResult};

/// A decoded device acknowledgement.
///
/// Payloads stay as strings; the caller knows which numeric type the issued
/// query expects and decodes with [`Response::parse_int`] /
/// [`Response::parse_float`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The bare `"*\r"` acknowledgement.
    Success,
    /// The device rejected the command; the message has marker and CR
    /// stripped.
    Error(String),
    /// A successful query answer carrying a payload.
    Value(String),
}

impl Response {
    /// Decode one complete frame as produced by the frame extractor.
    pub fn decode(frame: &[u8]) -> PtuResult<Response> {
        if frame.len() < 2 {
            return Err(PtuError::MalformedFrame(format!(
                "frame too short ({} bytes)",
                frame.len()
            )));
        }

        let body = strip_cr(frame);
        match frame[0] {
            ERR_BEG => Ok(Response::Error(text(&body[1..]))),
            SUCC_BEG => {
                if frame == SUCC_FRAME {
                    return Ok(Response::Success);
                }
                // A payload-bearing success frame reads "* <payload>\r".
                if frame[1] != b' ' {
                    return Err(PtuError::MalformedFrame(format!(
                        "success frame without payload separator: {:?}",
                        text(&body)
                    )));
                }
                Ok(Response::Value(text(&body[2..])))
            }
            other => Err(PtuError::MalformedFrame(format!(
                "frame starts with {:?}, expected '*' or '!'",
                other as char
            ))),
        }
    }

    /// Decode a value payload as a signed integer.
    pub fn parse_int(&self) -> PtuResult<i64> {
        let payload = self.payload()?;
        payload
            .trim()
            .parse()
            .map_err(|_| PtuError::Parse(format!("expected integer payload, got {payload:?}")))
    }

    /// Decode a value payload as a float.
    pub fn parse_float(&self) -> PtuResult<f64> {
        let payload = self.payload()?;
        payload
            .trim()
            .parse()
            .map_err(|_| PtuError::Parse(format!("expected float payload, got {payload:?}")))
    }

    fn payload(&self) -> PtuResult<&str> {
        match self {
            Response::Value(payload) => Ok(payload),
            Response::Success => Err(PtuError::Parse(
                "expected a value payload, got bare success".into(),
            )),
            Response::Error(msg) => Err(PtuError::Device(msg.clone())),
        }
    }
}

/// Frame body without its trailing carriage return.
fn strip_cr(frame: &[u8]) -> &[u8] {
    match frame.last() {
        Some(&DELIM_CR) => &frame[..frame.len() - 1],
        _ => frame,
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_success() {
        assert_eq!(Response::decode(b"*\r").unwrap(), Response::Success);
    }

    #[test]
    fn error_payload_is_stripped_of_marker_and_cr() {
        assert_eq!(
            Response::decode(b"!bad axis\r").unwrap(),
            Response::Error("bad axis".into())
        );
    }

    #[test]
    fn value_payload() {
        let resp = Response::decode(b"* 42\r").unwrap();
        assert_eq!(resp, Response::Value("42".into()));
        assert_eq!(resp.parse_int().unwrap(), 42);

        let resp = Response::decode(b"* 185.1428\r").unwrap();
        assert!((resp.parse_float().unwrap() - 185.1428).abs() < 1e-9);
    }

    #[test]
    fn negative_payloads_decode() {
        let resp = Response::decode(b"* -3090\r").unwrap();
        assert_eq!(resp.parse_int().unwrap(), -3090);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(
            Response::decode(b"*"),
            Err(PtuError::MalformedFrame(_))
        ));
        assert!(matches!(
            Response::decode(b"ok\r"),
            Err(PtuError::MalformedFrame(_))
        ));
        assert!(matches!(
            Response::decode(b"*X\r"),
            Err(PtuError::MalformedFrame(_))
        ));
    }

    #[test]
    fn non_numeric_payload_is_a_parse_error() {
        let resp = Response::decode(b"* stuck\r").unwrap();
        assert!(matches!(resp.parse_int(), Err(PtuError::Parse(_))));
        assert!(matches!(resp.parse_float(), Err(PtuError::Parse(_))));
    }
}
