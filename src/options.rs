//! Wire format for the congestion-window TCP option
//!
//! The sender piggybacks its current congestion window on acknowledgment
//! segments so the receiver's adaptive delayed-ACK logic can follow the
//! sender's window trend.

use bytes::{Buf, BufMut};
use thiserror::Error;
use tracing::warn;

/// Option kind identifier (experimental range, RFC 4727)
pub const CWND_OPTION_KIND: u8 = 253;

/// Fixed value of the option's length byte
const CWND_OPTION_LEN: u8 = 6;

/// Congestion-window option carried on acknowledgment segments
///
/// Layout on the wire: one kind byte, one length byte fixed at 6, and the
/// window as a big-endian unsigned 32-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CwndOption {
    /// Sender congestion window in bytes
    pub cwnd: u32,
}

/// The option's kind or length byte did not match, or the buffer was short
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("malformed congestion-window option")]
pub struct MalformedOption;

impl CwndOption {
    /// Number of bytes [`Self::encode`] writes
    pub const SIZE: usize = CWND_OPTION_LEN as usize;

    /// Append the option to `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(CWND_OPTION_KIND);
        buf.put_u8(CWND_OPTION_LEN);
        buf.put_u32(self.cwnd);
    }

    /// Decode one option from the start of `bytes`
    ///
    /// Returns the option and the number of bytes consumed. A truncated
    /// buffer or a mismatched kind or length byte consumes nothing; the
    /// caller discards the option and processes the rest of the segment
    /// normally.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), MalformedOption> {
        let mut buf = bytes;
        if buf.remaining() < Self::SIZE {
            warn!(len = bytes.len(), "truncated congestion-window option");
            return Err(MalformedOption);
        }
        if buf.get_u8() != CWND_OPTION_KIND {
            warn!("congestion-window option with wrong kind");
            return Err(MalformedOption);
        }
        if buf.get_u8() != CWND_OPTION_LEN {
            warn!("congestion-window option with wrong length");
            return Err(MalformedOption);
        }
        let cwnd = buf.get_u32();
        Ok((Self { cwnd }, Self::SIZE))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn round_trip() {
        let option = CwndOption { cwnd: 65_535 };
        let mut buf = Vec::new();
        option.encode(&mut buf);
        assert_eq!(buf, [253, 6, 0, 0, 0xff, 0xff]);

        let (decoded, consumed) = CwndOption::decode(&buf).expect("well-formed option");
        assert_eq!(decoded, option);
        assert_eq!(consumed, CwndOption::SIZE);
    }

    #[test]
    fn corrupt_length_is_rejected() {
        let mut buf = Vec::new();
        CwndOption { cwnd: 65_535 }.encode(&mut buf);
        buf[1] = 7;
        assert_matches!(CwndOption::decode(&buf), Err(MalformedOption));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut buf = Vec::new();
        CwndOption { cwnd: 1 }.encode(&mut buf);
        buf[0] = 8;
        assert_matches!(CwndOption::decode(&buf), Err(MalformedOption));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut buf = Vec::new();
        CwndOption { cwnd: 1 }.encode(&mut buf);
        assert_matches!(CwndOption::decode(&buf[..4]), Err(MalformedOption));
    }

    #[test]
    fn network_byte_order() {
        let mut buf = Vec::new();
        CwndOption { cwnd: 0x0102_0304 }.encode(&mut buf);
        assert_eq!(&buf[2..], [1, 2, 3, 4]);
    }
}
