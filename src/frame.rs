//! Response framing over the raw receive stream.
//!
//! The device answers with frames of the form `"*...\r"` or `"!...\r"`.
//! [`locate_frame`] inspects whatever bytes have accumulated so far and tells
//! the read loop what to do with them; it never consumes anything itself, so
//! a timed-out read leaves the buffer coherent and a later call picks up
//! where the stream left off.

use crate::cmd::{DELIM_CR, ERR_BEG, SUCC_BEG};

/// Outcome of one framing pass over the accumulated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    /// The first `n` bytes form one complete frame, CR included.
    Consumed(usize),
    /// A frame has started but its CR has not arrived yet.
    NeedMoreData,
    /// The first `n` bytes are noise and must be dropped.
    Discard(usize),
}

/// The framing hook the transport read loop calls back into.
///
/// Kept as a trait so the read loop ([`crate::transport::FrameBuffer`]) stays
/// generic over the protocol it frames.
pub trait FrameLocator {
    /// Classify the current buffer contents. Must not mutate any state.
    fn locate_frame(&self, buf: &[u8]) -> FrameStep;
}

/// Framing rules of the pan-tilt acknowledgement protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct PtuFrameLocator;

impl FrameLocator for PtuFrameLocator {
    fn locate_frame(&self, buf: &[u8]) -> FrameStep {
        locate_frame(buf)
    }
}

/// Locate one response frame in `buf`.
///
/// The start marker (`*` or `!`) and the carriage return are searched for
/// independently; a CR only terminates a frame that begins with a recognized
/// start marker, so a buffer containing a CR but no marker is still noise.
pub fn locate_frame(buf: &[u8]) -> FrameStep {
    if buf.is_empty() {
        return FrameStep::NeedMoreData;
    }

    let beg = buf.iter().position(|&b| b == SUCC_BEG || b == ERR_BEG);
    let end = buf.iter().position(|&b| b == DELIM_CR);

    match (beg, end) {
        // No start marker anywhere: the whole buffer is noise, CRs included.
        (None, _) => FrameStep::Discard(buf.len()),
        // Marker present but misaligned: drop the leading noise so the
        // marker sits at offset 0 on the next pass.
        (Some(beg), _) if beg > 0 => FrameStep::Discard(beg),
        // Frame started, terminator still in flight.
        (Some(_), None) => FrameStep::NeedMoreData,
        // Complete frame, CR inclusive.
        (Some(_), Some(end)) => FrameStep::Consumed(end + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_without_marker_is_discarded_whole() {
        assert_eq!(locate_frame(b"junk"), FrameStep::Discard(4));
        // A CR is not a terminator without a preceding start marker.
        assert_eq!(locate_frame(b"junk\rmore"), FrameStep::Discard(9));
    }

    #[test]
    fn leading_noise_is_trimmed_to_the_marker() {
        assert_eq!(locate_frame(b"garbageX*OK\r"), FrameStep::Discard(8));
        assert_eq!(locate_frame(b"x!err\r"), FrameStep::Discard(1));
    }

    #[test]
    fn incomplete_frame_waits_for_more_bytes() {
        assert_eq!(locate_frame(b"*"), FrameStep::NeedMoreData);
        assert_eq!(locate_frame(b"* 12"), FrameStep::NeedMoreData);
        assert_eq!(locate_frame(b""), FrameStep::NeedMoreData);
    }

    #[test]
    fn complete_frames_are_consumed_cr_inclusive() {
        assert_eq!(locate_frame(b"* 1234\r"), FrameStep::Consumed(7));
        assert_eq!(locate_frame(b"*\r"), FrameStep::Consumed(2));
        assert_eq!(locate_frame(b"!bad axis\r"), FrameStep::Consumed(10));
        // Only the first frame is reported; the rest stays buffered.
        assert_eq!(locate_frame(b"*\r* 5\r"), FrameStep::Consumed(2));
    }

    #[test]
    fn repeated_application_converges() {
        // Applying the returned action repeatedly must end in a frame or an
        // empty buffer within a bounded number of steps.
        let mut buf = b"noise*\rtrailing".to_vec();
        let mut frames = 0;
        for _ in 0..8 {
            match locate_frame(&buf) {
                FrameStep::Consumed(n) => {
                    buf.drain(..n);
                    frames += 1;
                }
                FrameStep::Discard(n) => {
                    assert!(n > 0);
                    buf.drain(..n);
                }
                FrameStep::NeedMoreData => break,
            }
        }
        assert_eq!(frames, 1);
        assert!(buf.is_empty());
    }
}
