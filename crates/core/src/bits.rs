//! Sub-byte packed memory helpers.
//!
//! Console memory packs 1, 2 or 4 bit values into bytes, lowest bits first.
//! A packed index `i` at resolution `n` bits lives in byte `i * n / 8` at bit
//! offset `(i * n) % 8`. Callers are responsible for bounds; the helpers
//! index the slice directly.

/// Read a 4-bit value (nibble) at a packed index.
#[inline]
pub fn peek4(data: &[u8], index: usize) -> u8 {
    (data[index >> 1] >> ((index & 1) << 2)) & 0x0F
}

/// Write a 4-bit value (nibble) at a packed index.
#[inline]
pub fn poke4(data: &mut [u8], index: usize, value: u8) {
    let shift = (index & 1) << 2;
    let byte = &mut data[index >> 1];
    *byte = (*byte & !(0x0F << shift)) | ((value & 0x0F) << shift);
}

/// Read a 2-bit value at a packed index.
#[inline]
pub fn peek2(data: &[u8], index: usize) -> u8 {
    (data[index >> 2] >> ((index & 3) << 1)) & 0x03
}

/// Write a 2-bit value at a packed index.
#[inline]
pub fn poke2(data: &mut [u8], index: usize, value: u8) {
    let shift = (index & 3) << 1;
    let byte = &mut data[index >> 2];
    *byte = (*byte & !(0x03 << shift)) | ((value & 0x03) << shift);
}

/// Read a single bit at a packed index.
#[inline]
pub fn peek1(data: &[u8], index: usize) -> u8 {
    (data[index >> 3] >> (index & 7)) & 0x01
}

/// Write a single bit at a packed index.
#[inline]
pub fn poke1(data: &mut [u8], index: usize, value: u8) {
    let shift = index & 7;
    let byte = &mut data[index >> 3];
    *byte = (*byte & !(0x01 << shift)) | ((value & 0x01) << shift);
}

/// Sign-extend the low `bits` bits of `value`.
#[inline]
pub fn sign_extend(value: u8, bits: u32) -> i8 {
    let shift = 8 - bits;
    ((value << shift) as i8) >> shift
}
