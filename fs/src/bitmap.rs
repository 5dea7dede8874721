//! Single-bit access into a bitmap stored inside a block.
//!
//! Bit `n` of a bitmap starting at byte offset `base` lives in byte
//! `base + n / 8`, LSB-first: the byte `0b0000_0001` has bit 0 set. Callers
//! keep `n` inside the bitmap's domain; only the block bounds are checked.

use bit_field::BitField;
use imgfs_api::error;
use imgfs_api::types::Block;

/// Read bit `n` of the bitmap at byte offset `base` in `b`
pub fn bit_get(b: &Block, base: u64, n: u64) -> error::Result<bool> {
    let mut byte = [0u8; 1];
    b.copy_out(base + n / 8, &mut byte)?;
    Ok(byte[0].get_bit((n % 8) as usize))
}

/// Set bit `n` of the bitmap at byte offset `base` in `b` to `v`
pub fn bit_put(b: &mut Block, base: u64, n: u64, v: bool) -> error::Result<()> {
    let mut byte = [0u8; 1];
    b.copy_out(base + n / 8, &mut byte)?;
    byte[0].set_bit((n % 8) as usize, v);
    b.copy_in(base + n / 8, &byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsb_first() {
        let mut b = Block::zeroed(0, 16);
        bit_put(&mut b, 0, 0, true).unwrap();
        //Bit 0 is the least significant bit of byte 0
        assert_eq!(b.bytes()[0], 0b0000_0001);
        bit_put(&mut b, 0, 9, true).unwrap();
        assert_eq!(b.bytes()[1], 0b0000_0010);

        assert!(bit_get(&b, 0, 0).unwrap());
        assert!(!bit_get(&b, 0, 1).unwrap());
        assert!(bit_get(&b, 0, 9).unwrap());

        bit_put(&mut b, 0, 0, false).unwrap();
        assert!(!bit_get(&b, 0, 0).unwrap());
        //Clearing one bit leaves its neighbors alone
        assert!(bit_get(&b, 0, 9).unwrap());
    }

    #[test]
    fn base_offset() {
        let mut b = Block::zeroed(0, 16);
        bit_put(&mut b, 4, 3, true).unwrap();
        assert_eq!(b.bytes()[4], 0b0000_1000);
        assert!(bit_get(&b, 4, 3).unwrap());
        assert!(!bit_get(&b, 0, 3).unwrap());

        //Past the end of the block the accessors refuse
        assert!(bit_get(&b, 0, 16 * 8).is_err());
    }
}
