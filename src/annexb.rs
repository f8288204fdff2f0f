//! A reader for the NAL Unit framing format defined in _ITU-T Recommendation H.265 - Annex B_,
//! as used when H265 data is carried in elementary streams and MPEG2 Transport Streams.
//!
//! Each NAL unit is preceded by the three byte start code prefix `00 00 01`, optionally with an
//! extra leading `zero_byte`, and may be followed by any number of `trailing_zero_8bits`.
//! Because emulation prevention guarantees that `00 00 00`, `00 00 01` and `00 00 02` never
//! appear inside a NAL unit, units can be delimited by searching for the next start code.

use log::*;
use memchr::memmem;

const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

#[derive(Debug, PartialEq, Eq)]
pub enum AnnexBError {
    /// The buffer did not begin with a start code (ignoring leading zero bytes).
    MissingStartCode,
}

/// One NAL unit found in an Annex B buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnexBUnit<'buf> {
    /// The NAL unit together with its start code (including any `zero_byte`).
    pub framed: &'buf [u8],
    /// The escaped NAL unit bytes, beginning with the two byte header.
    pub nal: &'buf [u8],
}

/// Iterator over the NAL units of a complete Annex B buffer.
///
/// Zero length units (adjacent start codes) are skipped.
#[derive(Debug, Clone)]
pub struct NalUnits<'buf> {
    data: &'buf [u8],
    /// Offset of the next start code prefix, if any.
    next: Option<usize>,
}

/// Splits `data` into NAL units, failing if the buffer does not start with a start code.
pub fn nal_units(data: &[u8]) -> Result<NalUnits<'_>, AnnexBError> {
    let leading_zeros = data.iter().take_while(|&&b| b == 0x00).count();
    if leading_zeros < 2 || data.get(leading_zeros) != Some(&0x01) {
        return Err(AnnexBError::MissingStartCode);
    }
    Ok(NalUnits {
        data,
        next: Some(leading_zeros - 2),
    })
}

impl<'buf> Iterator for NalUnits<'buf> {
    type Item = AnnexBUnit<'buf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let prefix = self.next?;
            let start = prefix + START_CODE.len();
            let end = match memmem::find(&self.data[start..], &START_CODE) {
                Some(pos) => {
                    self.next = Some(start + pos);
                    start + pos
                }
                None => {
                    self.next = None;
                    self.data.len()
                }
            };
            // trailing_zero_8bits, and the zero_byte of the following start code
            let nal_end = start
                + self.data[start..end]
                    .iter()
                    .rposition(|&b| b != 0x00)
                    .map_or(0, |p| p + 1);
            if nal_end == start {
                trace!("skipping empty NAL unit at offset {}", start);
                continue;
            }
            let framed_start = if prefix > 0 && self.data[prefix - 1] == 0x00 {
                prefix - 1
            } else {
                prefix
            };
            return Some(AnnexBUnit {
                framed: &self.data[framed_start..nal_end],
                nal: &self.data[start..nal_end],
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use test_case::test_case;

    fn nals(data: &[u8]) -> Vec<&[u8]> {
        nal_units(data).unwrap().map(|u| u.nal).collect()
    }

    #[test]
    fn simple_nal() {
        let data = hex!("00 00 01 40 01 0C 00 00 01 42 01 01");
        assert_eq!(nals(&data), vec![&hex!("40 01 0C")[..], &hex!("42 01 01")[..]]);
    }

    #[test]
    fn long_start_codes() {
        let data = hex!("00 00 00 01 40 01 0C 00 00 00 01 42 01 01");
        let units: Vec<_> = nal_units(&data).unwrap().collect();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].framed, &hex!("00 00 00 01 40 01 0C")[..]);
        assert_eq!(units[0].nal, &hex!("40 01 0C")[..]);
        assert_eq!(units[1].framed, &hex!("00 00 00 01 42 01 01")[..]);
    }

    #[test]
    fn trailing_zero() {
        let data = hex!("00 00 01 26 01 AF 00 00 00 00 00 01 02 01 D0 00 00");
        assert_eq!(nals(&data), vec![&hex!("26 01 AF")[..], &hex!("02 01 D0")[..]]);
    }

    #[test]
    fn escaped_data_is_not_a_start_code() {
        let data = hex!("00 00 01 26 01 00 00 03 01 80");
        assert_eq!(nals(&data), vec![&hex!("26 01 00 00 03 01 80")[..]]);
    }

    #[test]
    fn empty_units_skipped() {
        let data = hex!("00 00 01 00 00 01 40 01 0C 00 00 01");
        assert_eq!(nals(&data), vec![&hex!("40 01 0C")[..]]);
    }

    #[test_case(&hex!(""); "empty")]
    #[test_case(&hex!("40 01 0C"); "no start code")]
    #[test_case(&hex!("00 01 40 01"); "short prefix")]
    #[test_case(&hex!("00 00 02 40 01"); "bad prefix")]
    fn missing_start_code(data: &[u8]) {
        assert_eq!(nal_units(data).err(), Some(AnnexBError::MissingStartCode));
    }
}
