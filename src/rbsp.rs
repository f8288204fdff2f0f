//! Reading and writing of the _Raw Byte Sequence Payload_ (RBSP) carried in H265 NAL units.
//!
//! The following byte sequences are not allowed to appear in a framed H265 bitstream,
//!
//!  - `0x00` `0x00` `0x00`
//!  - `0x00` `0x00` `0x01`
//!  - `0x00` `0x00` `0x02`
//!  - `0x00` `0x00` `0x03`
//!
//! therefore if these byte sequences do appear in the raw bitstream, an 'escaping' mechanism
//! (called 'emulation prevention' in H.265) is applied by adding a `0x03` byte between the
//! second and third bytes in the above sequence, resulting in the following encoded versions,
//!
//!  - `0x00` `0x00` **`0x03`** `0x00`
//!  - `0x00` `0x00` **`0x03`** `0x01`
//!  - `0x00` `0x00` **`0x03`** `0x02`
//!  - `0x00` `0x00` **`0x03`** `0x03`
//!
//! [`decode_nal`] removes this encoding, [`ByteWriter`] applies it, and [`BitReader`] /
//! [`BitWriter`] provide the bit-level syntax element access (including Exp-Golomb codes) used
//! by the parameter set and slice header modules.

use bitstream_io::{BigEndian, BitRead as _, BitWrite as _};
use std::borrow::Cow;
use std::io::{self, Write};

/// Length in bytes of the H265 NAL unit header.
pub const NAL_HEADER_LEN: usize = 2;

/// Removes the two-byte NAL header and any emulation prevention bytes, yielding the RBSP.
///
/// Returns borrowed data when no escaping was present.
pub fn decode_nal(nal_unit: &[u8]) -> Result<Cow<'_, [u8]>, BitReaderError> {
    if nal_unit.len() < NAL_HEADER_LEN {
        return Err(BitReaderError::ReaderErrorFor(
            "nal_unit_header",
            io::Error::new(io::ErrorKind::UnexpectedEof, "nal header truncated"),
        ));
    }
    Ok(unescape(&nal_unit[NAL_HEADER_LEN..]))
}

/// Removes emulation prevention bytes from NAL unit payload bytes that carry no header.
pub fn unescape(data: &[u8]) -> Cow<'_, [u8]> {
    let mut escapes = memchr::memmem::find_iter(data, &[0x00, 0x00, 0x03]).peekable();
    if escapes.peek().is_none() {
        return Cow::Borrowed(data);
    }
    let mut out = Vec::with_capacity(data.len());
    let mut last = 0;
    for pos in escapes {
        // keep the two zero bytes, drop the 0x03
        out.extend_from_slice(&data[last..pos + 2]);
        last = pos + 3;
    }
    out.extend_from_slice(&data[last..]);
    Cow::Owned(out)
}

#[derive(Debug)]
pub enum BitReaderError {
    ReaderError(io::Error),
    ReaderErrorFor(&'static str, io::Error),

    /// An Exp-Golomb-coded syntax elements value has more than 32 bits.
    ExpGolombTooLarge(&'static str),

    /// The stream was positioned before the final one bit on [BitRead::finish_rbsp].
    RemainingData,

    /// The stream ended before the `rbsp_stop_one_bit`.
    MissingStopBit,
}

/// Bit-level access to RBSP syntax elements, named for the sake of error messages.
pub trait BitRead {
    fn read_ue(&mut self, name: &'static str) -> Result<u32, BitReaderError>;
    fn read_se(&mut self, name: &'static str) -> Result<i32, BitReaderError>;
    fn read_bool(&mut self, name: &'static str) -> Result<bool, BitReaderError>;
    /// Reads an unsigned value of `bit_count` bits (at most 32).
    fn read_u32(&mut self, bit_count: u32, name: &'static str) -> Result<u32, BitReaderError>;
    fn read_u8(&mut self, bit_count: u32, name: &'static str) -> Result<u8, BitReaderError> {
        debug_assert!(bit_count <= 8);
        Ok(self.read_u32(bit_count, name)? as u8)
    }
    fn skip(&mut self, bit_count: u32, name: &'static str) -> Result<(), BitReaderError>;

    /// Returns true if positioned before the RBSP trailing bits.
    ///
    /// This matches the definition of `more_rbsp_data()` in Rec. ITU-T H.265 section 7.2.
    fn has_more_rbsp_data(&mut self, name: &'static str) -> Result<bool, BitReaderError>;

    /// Consumes the `rbsp_trailing_bits()`, failing if any other data remains.
    fn finish_rbsp(self) -> Result<(), BitReaderError>;

    fn byte_aligned(&self) -> bool;

    /// Number of bits consumed so far.
    fn position(&self) -> u64;
}

/// Reads H265 bitstream syntax elements from an RBSP representation (no NAL header byte or
/// emulation prevention three bytes).
pub struct BitReader<'buf> {
    data: &'buf [u8],
    reader: bitstream_io::BitReader<io::Cursor<&'buf [u8]>, BigEndian>,
    position: u64,
}
impl<'buf> BitReader<'buf> {
    pub fn new(data: &'buf [u8]) -> Self {
        Self {
            data,
            reader: bitstream_io::BitReader::endian(io::Cursor::new(data), BigEndian),
            position: 0,
        }
    }

    /// Bit position of the `rbsp_stop_one_bit`, being the last bit set in the buffer.
    fn stop_bit_position(&self) -> Option<u64> {
        let (i, &b) = self.data.iter().enumerate().rev().find(|(_, &b)| b != 0)?;
        Some(i as u64 * 8 + 7 - u64::from(b.trailing_zeros()))
    }

    /// The unread remainder of the RBSP, which must start on a byte boundary.
    pub fn remaining_bytes(&self) -> Option<&'buf [u8]> {
        if self.position % 8 == 0 {
            self.data.get((self.position / 8) as usize..)
        } else {
            None
        }
    }
}

impl<'buf> BitRead for BitReader<'buf> {
    fn read_ue(&mut self, name: &'static str) -> Result<u32, BitReaderError> {
        let count = count_zero_bits(self, name)?;
        if count > 0 {
            let val = self.read_u32(count, name)?;
            Ok(((1u64 << count) - 1 + u64::from(val)) as u32)
        } else {
            Ok(0)
        }
    }

    fn read_se(&mut self, name: &'static str) -> Result<i32, BitReaderError> {
        Ok(golomb_to_signed(self.read_ue(name)?))
    }

    fn read_bool(&mut self, name: &'static str) -> Result<bool, BitReaderError> {
        let bit = self
            .reader
            .read_bit()
            .map_err(|e| BitReaderError::ReaderErrorFor(name, e))?;
        self.position += 1;
        Ok(bit)
    }

    fn read_u32(&mut self, bit_count: u32, name: &'static str) -> Result<u32, BitReaderError> {
        if bit_count == 0 {
            return Ok(0);
        }
        let val = self
            .reader
            .read_var::<u32>(bit_count)
            .map_err(|e| BitReaderError::ReaderErrorFor(name, e))?;
        self.position += u64::from(bit_count);
        Ok(val)
    }

    fn skip(&mut self, bit_count: u32, name: &'static str) -> Result<(), BitReaderError> {
        self.reader
            .skip(bit_count)
            .map_err(|e| BitReaderError::ReaderErrorFor(name, e))?;
        self.position += u64::from(bit_count);
        Ok(())
    }

    fn has_more_rbsp_data(&mut self, _name: &'static str) -> Result<bool, BitReaderError> {
        Ok(matches!(self.stop_bit_position(), Some(stop) if self.position < stop))
    }

    fn finish_rbsp(mut self) -> Result<(), BitReaderError> {
        match self.stop_bit_position() {
            None => Err(BitReaderError::MissingStopBit),
            Some(stop) if self.position < stop => Err(BitReaderError::RemainingData),
            Some(stop) if self.position > stop => Err(BitReaderError::MissingStopBit),
            Some(_) => {
                let bit = self.read_bool("rbsp_stop_one_bit")?;
                debug_assert!(bit);
                Ok(())
            }
        }
    }

    fn byte_aligned(&self) -> bool {
        self.position % 8 == 0
    }

    fn position(&self) -> u64 {
        self.position
    }
}

fn count_zero_bits<R: BitRead>(r: &mut R, name: &'static str) -> Result<u32, BitReaderError> {
    let mut count = 0;
    while !r.read_bool(name)? {
        count += 1;
        if count > 31 {
            return Err(BitReaderError::ExpGolombTooLarge(name));
        }
    }
    Ok(count)
}

fn golomb_to_signed(val: u32) -> i32 {
    let sign = (((val & 0x1) as i32) << 1) - 1;
    ((val >> 1) as i32 + (val & 0x1) as i32) * sign
}

#[derive(Debug)]
pub enum WriteError {
    Io(io::Error),
    /// The syntax structure uses a feature this crate does not know how to write.
    Unsupported(&'static str),
    /// A value does not fit the syntax element it is destined for.
    InvalidValue { name: &'static str, value: i64 },
    /// A byte-oriented operation was attempted in the middle of a byte.
    NotByteAligned,
}
impl From<io::Error> for WriteError {
    fn from(e: io::Error) -> Self {
        WriteError::Io(e)
    }
}

/// Writes bytes, inserting emulation prevention three bytes so that the output never contains
/// a start code prefix.
pub struct ByteWriter<W: Write> {
    inner: W,
    zero_count: u8,
    count: usize,
}
impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            zero_count: 0,
            count: 0,
        }
    }

    /// Writes bytes without escaping and forgets any preceding zero bytes; used for start codes.
    pub fn write_raw(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf)?;
        self.count += buf.len();
        self.zero_count = 0;
        Ok(())
    }

    /// Number of bytes written, including inserted emulation prevention bytes.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn reset(&mut self) {
        self.zero_count = 0;
        self.count = 0;
    }
}
impl<W: Write> Write for ByteWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            if self.zero_count == 2 && b < 0x04 {
                self.inner.write_all(&[0x03])?;
                self.count += 1;
                self.zero_count = 0;
            }
            self.inner.write_all(&[b])?;
            self.count += 1;
            self.zero_count = if b == 0x00 { self.zero_count + 1 } else { 0 };
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes H265 bitstream syntax elements, producing an escaped (Annex B ready) byte stream.
pub struct BitWriter<W: Write> {
    inner: bitstream_io::BitWriter<ByteWriter<W>, BigEndian>,
}
impl<W: Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: bitstream_io::BitWriter::endian(ByteWriter::new(inner), BigEndian),
        }
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), WriteError> {
        self.inner.write_bit(bit)?;
        Ok(())
    }

    /// Writes the low `bit_count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, bit_count: u32, value: u32) -> Result<(), WriteError> {
        if bit_count == 0 {
            return Ok(());
        }
        if bit_count > 32 || (bit_count < 32 && value >> bit_count != 0) {
            return Err(WriteError::InvalidValue {
                name: "bits",
                value: i64::from(value),
            });
        }
        self.inner.write_var::<u32>(bit_count, value)?;
        Ok(())
    }

    /// `ue(v)`: unsigned Exp-Golomb code, `2k+1` bits where `k = floor(log2(code_num + 1))`.
    pub fn write_ue(&mut self, code_num: u32) -> Result<(), WriteError> {
        self.write_exp_golomb(u64::from(code_num))
    }

    /// `se(v)`: signed Exp-Golomb code, positive values mapping to odd code numbers.
    pub fn write_se(&mut self, value: i32) -> Result<(), WriteError> {
        let value = i64::from(value);
        let code_num = if value <= 0 { -value * 2 } else { value * 2 - 1 };
        self.write_exp_golomb(code_num as u64)
    }

    fn write_exp_golomb(&mut self, code_num: u64) -> Result<(), WriteError> {
        let value = code_num + 1;
        let k = 63 - value.leading_zeros();
        let mut zeros = k;
        while zeros > 0 {
            let n = zeros.min(32);
            self.write_bits(n, 0)?;
            zeros -= n;
        }
        // k + 1 bits, which is 33 only for code_num == u32::MAX
        if k == 32 {
            self.write_bit(true)?;
            self.write_bits(32, value as u32)
        } else {
            self.write_bits(k + 1, value as u32)
        }
    }

    /// `rbsp_trailing_bits()`, also used for the slice header's `byte_alignment()`.
    pub fn write_rbsp_trailing_bits(&mut self) -> Result<(), WriteError> {
        self.write_bit(true)?;
        while !self.inner.byte_aligned() {
            self.write_bit(false)?;
        }
        Ok(())
    }

    /// Writes a start code followed by the two byte NAL header, with `nuh_layer_id` zero.
    ///
    /// The `zero_byte` preceding the start code prefix is written when `long_start_code` is
    /// set, as required for parameter sets and the first NAL unit of an access unit.
    pub fn write_nal_header(
        &mut self,
        nal_unit_type: crate::nal::UnitType,
        temporal_id: u8,
        long_start_code: bool,
    ) -> Result<(), WriteError> {
        if temporal_id > 6 {
            return Err(WriteError::InvalidValue {
                name: "nuh_temporal_id_plus1",
                value: i64::from(temporal_id) + 1,
            });
        }
        let bytes = self.byte_writer()?;
        if long_start_code {
            bytes.write_raw(&[0x00])?;
        }
        bytes.write_raw(&[0x00, 0x00, 0x01])?;
        self.write_bits(8, u32::from(nal_unit_type.id()) << 1)?;
        self.write_bits(8, u32::from(temporal_id + 1))
    }

    /// Appends byte-aligned RBSP bytes (e.g. slice data), escaping them as needed.
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<(), WriteError> {
        self.byte_writer()?.write_all(payload)?;
        Ok(())
    }

    pub fn byte_aligned(&self) -> bool {
        self.inner.byte_aligned()
    }

    /// Number of bytes written so far, including start codes and emulation prevention bytes.
    pub fn byte_count(&mut self) -> Result<usize, WriteError> {
        Ok(self.byte_writer()?.count())
    }

    fn byte_writer(&mut self) -> Result<&mut ByteWriter<W>, WriteError> {
        self.inner.writer().ok_or(WriteError::NotByteAligned)
    }

    /// Returns the underlying writer, which only holds whole bytes when `byte_aligned()`.
    pub fn into_inner(self) -> W {
        self.inner.into_writer().into_inner()
    }
}
impl BitWriter<Vec<u8>> {
    /// Copies the written bytes into `buf`, which must be at least `byte_count()` long.
    pub fn fetch_into(&mut self, buf: &mut [u8]) -> Result<usize, WriteError> {
        let data = self.byte_writer()?.get_ref();
        let dst = buf.get_mut(..data.len()).ok_or(WriteError::InvalidValue {
            name: "fetch_into buffer length",
            value: data.len() as i64,
        })?;
        dst.copy_from_slice(data);
        Ok(data.len())
    }

    /// Moves out the written bytes, leaving the writer empty.
    pub fn take(&mut self) -> Result<Vec<u8>, WriteError> {
        let w = self.byte_writer()?;
        w.reset();
        Ok(std::mem::take(w.get_mut()))
    }

    /// Discards everything written, including any partial byte.
    pub fn reset(&mut self) {
        let mut buf = match self.inner.writer() {
            Some(w) => std::mem::take(w.get_mut()),
            None => Vec::new(),
        };
        buf.clear();
        self.inner = bitstream_io::BitWriter::endian(ByteWriter::new(buf), BigEndian);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::UnitType;
    use hex_literal::hex;
    use test_case::test_case;

    fn written(f: impl FnOnce(&mut BitWriter<Vec<u8>>) -> Result<(), WriteError>) -> Vec<u8> {
        let mut w = BitWriter::new(Vec::new());
        f(&mut w).unwrap();
        while !w.byte_aligned() {
            w.write_bit(false).unwrap();
        }
        w.into_inner()
    }

    #[test_case(0, &hex!("80"); "zero")]
    #[test_case(1, &hex!("40"); "one")]
    #[test_case(2, &hex!("60"); "two")]
    #[test_case(3, &hex!("20"); "three")]
    #[test_case(7, &hex!("10"); "seven")]
    #[test_case(254, &hex!("01 FE"); "two five four")]
    fn ue_encoding(code_num: u32, expected: &[u8]) {
        assert_eq!(written(|w| w.write_ue(code_num)), expected);
    }

    #[test]
    fn ue_round_trip() {
        let values: Vec<u32> = (0..1 << 20)
            .step_by(997)
            .chain([1 << 20, u32::MAX - 1, u32::MAX].iter().copied())
            .collect();
        let escaped = written(|w| {
            for &v in &values {
                w.write_ue(v)?;
            }
            Ok(())
        });
        let data = unescape(&escaped);
        let mut r = BitReader::new(&data);
        for &v in &values {
            // u32::MAX needs a 32 bit prefix, which the reader refuses
            if v == u32::MAX {
                assert!(matches!(
                    r.read_ue("v"),
                    Err(BitReaderError::ExpGolombTooLarge("v"))
                ));
                break;
            }
            assert_eq!(r.read_ue("v").unwrap(), v);
        }
    }

    #[test]
    fn se_bijection() {
        let values = [0, 1, -1, 2, -2, 63, -64, 1000, -1000, i32::MAX, i32::MIN + 1];
        let escaped = written(|w| {
            for &v in &values {
                w.write_se(v)?;
            }
            Ok(())
        });
        let data = unescape(&escaped);
        let mut r = BitReader::new(&data);
        for &v in &values {
            assert_eq!(r.read_se("v").unwrap(), v);
        }
        // signed mapping: 0, 1, -1, 2, -2 take code numbers 0, 1, 2, 3, 4
        let mut w = BitWriter::new(Vec::new());
        for v in [0, 1, -1, 2, -2] {
            w.write_se(v).unwrap();
        }
        let mut expected = BitWriter::new(Vec::new());
        for v in 0..5 {
            expected.write_ue(v).unwrap();
        }
        w.write_rbsp_trailing_bits().unwrap();
        expected.write_rbsp_trailing_bits().unwrap();
        assert_eq!(w.into_inner(), expected.into_inner());
    }

    #[test_case(&hex!("00 00 00"), &hex!("00 00 03 00"); "zero")]
    #[test_case(&hex!("00 00 01"), &hex!("00 00 03 01"); "one")]
    #[test_case(&hex!("00 00 02"), &hex!("00 00 03 02"); "two")]
    #[test_case(&hex!("00 00 03"), &hex!("00 00 03 03"); "three")]
    #[test_case(&hex!("00 00 04"), &hex!("00 00 04"); "four untouched")]
    #[test_case(&hex!("00 00 00 00 00"), &hex!("00 00 03 00 00 03 00"); "run of zeros")]
    #[test_case(&hex!("00 01 00 00"), &hex!("00 01 00 00"); "trailing zeros")]
    fn emulation_prevention(rbsp: &[u8], escaped: &[u8]) {
        let mut out = vec![];
        ByteWriter::new(&mut out).write_all(rbsp).unwrap();
        assert_eq!(out, escaped);

        let mut nal = vec![0x02, 0x01];
        nal.extend_from_slice(escaped);
        assert_eq!(&*decode_nal(&nal).unwrap(), rbsp);
    }

    #[test]
    fn escape_state_spans_writes() {
        let mut out = vec![];
        let mut w = ByteWriter::new(&mut out);
        w.write_all(&[0x00]).unwrap();
        w.write_all(&[0x00]).unwrap();
        w.write_all(&[0x01]).unwrap();
        assert_eq!(w.count(), 4);
        drop(w);
        assert_eq!(out, hex!("00 00 03 01"));
    }

    #[test]
    fn decode_borrows_when_unescaped() {
        let nal = hex!("40 01 0C 01 FF FF");
        assert!(matches!(decode_nal(&nal).unwrap(), Cow::Borrowed(&[0x0C, 0x01, 0xFF, 0xFF])));
        assert!(decode_nal(&hex!("40")).is_err());
    }

    #[test]
    fn nal_header() {
        let mut w = BitWriter::new(Vec::new());
        w.write_nal_header(UnitType::VpsNut, 0, true).unwrap();
        w.write_nal_header(UnitType::TrailN, 0, false).unwrap();
        w.write_nal_header(UnitType::TrailR, 2, false).unwrap();
        assert_eq!(w.byte_count().unwrap(), 6 + 5 + 5);
        assert_eq!(
            w.into_inner(),
            hex!("00 00 00 01 40 01  00 00 01 00 01  00 00 01 02 03")
        );
    }

    #[test]
    fn nal_header_resets_escaping() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(8, 0x80).unwrap();
        w.write_payload(&[0x00, 0x00]).unwrap();
        w.write_nal_header(UnitType::PpsNut, 0, false).unwrap();
        assert_eq!(w.into_inner(), hex!("80 00 00 00 00 01 44 01"));
    }

    #[test]
    fn unaligned_header_refused() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bit(true).unwrap();
        assert!(matches!(
            w.write_nal_header(UnitType::SpsNut, 0, true),
            Err(WriteError::NotByteAligned)
        ));
        assert!(matches!(
            w.write_payload(&[1]),
            Err(WriteError::NotByteAligned)
        ));
    }

    #[test]
    fn bits_out_of_range() {
        let mut w = BitWriter::new(Vec::new());
        assert!(matches!(
            w.write_bits(3, 8),
            Err(WriteError::InvalidValue { .. })
        ));
        assert!(w.write_bits(32, u32::MAX).is_ok());
    }

    #[test]
    fn take_and_reset() {
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(8, 0xAB).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(w.fetch_into(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0xAB);
        assert_eq!(w.take().unwrap(), vec![0xAB]);
        assert_eq!(w.byte_count().unwrap(), 0);
        w.write_bits(4, 0xF).unwrap();
        w.reset();
        assert!(w.byte_aligned());
        w.write_bits(8, 0x12).unwrap();
        assert_eq!(w.take().unwrap(), vec![0x12]);
    }

    #[test]
    fn trailing_bits() {
        assert_eq!(written(|w| w.write_rbsp_trailing_bits()), hex!("80"));
        assert_eq!(
            written(|w| {
                w.write_bits(3, 0b101)?;
                w.write_rbsp_trailing_bits()
            }),
            hex!("B0")
        );
    }

    #[test]
    fn more_rbsp_data() {
        let data = hex!("A0 80 00");
        let mut r = BitReader::new(&data[..]);
        assert!(r.has_more_rbsp_data("").unwrap());
        r.skip(8, "").unwrap();
        assert!(!r.has_more_rbsp_data("").unwrap());
        r.finish_rbsp().unwrap();

        let mut r = BitReader::new(&data[..]);
        r.read_u32(3, "").unwrap();
        assert!(matches!(r.finish_rbsp(), Err(BitReaderError::RemainingData)));
        assert!(matches!(
            BitReader::new(&[0, 0]).finish_rbsp(),
            Err(BitReaderError::MissingStopBit)
        ));
    }

    #[test]
    fn remaining_bytes() {
        let data = hex!("12 34 56");
        let mut r = BitReader::new(&data[..]);
        r.read_u32(4, "").unwrap();
        assert_eq!(r.remaining_bytes(), None);
        r.read_u32(4, "").unwrap();
        assert_eq!(r.remaining_bytes(), Some(&data[1..]));
        assert_eq!(r.position(), 8);
    }
}
