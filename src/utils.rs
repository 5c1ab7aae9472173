//! Helpers for bitmasks and channel state arrays.
//!
//! # Example
//!
//! ```
//! use iob16_modbus::utils::{active_channels, rising_edges, word_to_bits};
//!
//! let before = word_to_bits(0b0000_0000_0000_0001);
//! let after = word_to_bits(0b0000_0000_0000_0101);
//!
//! assert_eq!(active_channels(&after), vec![1, 3]);
//! assert_eq!(rising_edges(&before, &after), vec![3]);
//! ```

/// Gets a single bit from a 16-bit word (bit 0 = LSB).
///
/// # Example
///
/// ```
/// use iob16_modbus::utils::get_bit;
///
/// assert!(get_bit(0b0100, 2));
/// assert!(!get_bit(0b0100, 1));
/// ```
#[inline]
pub fn get_bit(value: u16, bit: u8) -> bool {
    bit < 16 && (value & (1 << bit)) != 0
}

/// Expands a bitmask into one boolean per channel; index 0 is bit 0.
pub fn word_to_bits(value: u16) -> [bool; 16] {
    std::array::from_fn(|i| get_bit(value, i as u8))
}

/// Packs channel states back into a bitmask.
///
/// # Example
///
/// ```
/// use iob16_modbus::utils::{bits_to_word, word_to_bits};
///
/// assert_eq!(bits_to_word(&word_to_bits(0xA5C3)), 0xA5C3);
/// ```
pub fn bits_to_word(bits: &[bool; 16]) -> u16 {
    bits.iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .fold(0u16, |word, (i, _)| word | (1 << i))
}

/// Channel numbers (1-based) that are ON.
pub fn active_channels(states: &[bool; 16]) -> Vec<u8> {
    states
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(i, _)| i as u8 + 1)
        .collect()
}

/// Channels (1-based) that went from OFF to ON between two readings.
pub fn rising_edges(previous: &[bool; 16], current: &[bool; 16]) -> Vec<u8> {
    edges(previous, current, |was, is| !was && is)
}

/// Channels (1-based) that went from ON to OFF between two readings.
///
/// # Example
///
/// ```
/// use iob16_modbus::utils::{falling_edges, word_to_bits};
///
/// let edges = falling_edges(&word_to_bits(0b11), &word_to_bits(0b01));
/// assert_eq!(edges, vec![2]);
/// ```
pub fn falling_edges(previous: &[bool; 16], current: &[bool; 16]) -> Vec<u8> {
    edges(previous, current, |was, is| was && !is)
}

fn edges(previous: &[bool; 16], current: &[bool; 16], hit: impl Fn(bool, bool) -> bool) -> Vec<u8> {
    previous
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (was, is))| hit(**was, **is))
        .map(|(i, _)| i as u8 + 1)
        .collect()
}

/// Formats a 16-bit word as grouped binary, e.g. `0b0000_0000_0000_0101`.
pub fn format_binary(value: u16) -> String {
    let binary = format!("{:016b}", value);
    format!(
        "0b{}_{}_{}_{}",
        &binary[0..4],
        &binary[4..8],
        &binary[8..12],
        &binary[12..16]
    )
}

/// Formats a 16-bit word as `0x0000`.
pub fn format_hex(value: u16) -> String {
    format!("0x{:04X}", value)
}

/// One character per channel, channel 1 first: `#` for ON, `.` for OFF.
///
/// # Example
///
/// ```
/// use iob16_modbus::utils::{format_states, word_to_bits};
///
/// assert_eq!(format_states(&word_to_bits(0b0101)), "#.#.............");
/// ```
pub fn format_states(states: &[bool; 16]) -> String {
    states.iter().map(|on| if *on { '#' } else { '.' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bit_out_of_range() {
        assert!(!get_bit(0xFFFF, 16));
        assert!(get_bit(0x8000, 15));
    }

    #[test]
    fn test_word_to_bits_lsb_first() {
        let bits = word_to_bits(0b0000_0000_0000_0101);
        let mut expected = [false; 16];
        expected[0] = true;
        expected[2] = true;
        assert_eq!(bits, expected);
    }

    #[test]
    fn test_bits_to_word() {
        let mut bits = [false; 16];
        bits[15] = true;
        bits[1] = true;
        assert_eq!(bits_to_word(&bits), 0x8002);
        assert_eq!(bits_to_word(&[false; 16]), 0);
    }

    #[test]
    fn test_active_channels() {
        assert_eq!(active_channels(&word_to_bits(0x8001)), vec![1, 16]);
        assert!(active_channels(&[false; 16]).is_empty());
    }

    #[test]
    fn test_edges() {
        let before = word_to_bits(0b0110);
        let after = word_to_bits(0b1100);
        assert_eq!(rising_edges(&before, &after), vec![4]);
        assert_eq!(falling_edges(&before, &after), vec![2]);
        assert!(rising_edges(&after, &after).is_empty());
    }

    #[test]
    fn test_format_binary() {
        assert_eq!(format_binary(0x1234), "0b0001_0010_0011_0100");
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(0x00C0), "0x00C0");
    }
}
