/// Set bit `bit` of `x` on if `toggle` is true, otherwise off.
pub fn bit(bit: u64, x: u64, toggle: bool) -> u64 {
    if toggle {
        x | (1 << bit)
    } else {
        x & !(1 << bit)
    }
}

/// Test whether bit `bit` of `x` is set.
pub fn test_bit(bit: u64, x: u64) -> bool {
    (x >> bit) & 1 == 1
}

/// Number of zero bytes needed to bring `len` up to a multiple of 8.
pub fn pad8(len: usize) -> usize {
    (8 - len % 8) % 8
}

/// `len` rounded up to the next multiple of 8.
pub fn round8(len: usize) -> usize {
    len + pad8(len)
}
