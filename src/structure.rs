//! sdspi-store - Field accessors for on-card structures.
//!
//! Every user provides `fn data(&self) -> &[u8]`; the setter forms also need
//! `fn data_mut(&mut self) -> &mut [u8]`.

/// `$num_bits` bits of `$byte`, starting at bit `$start`.
#[cfg_attr(not(feature = "spi"), allow(unused_macros))]
macro_rules! bits {
    ($byte:expr, $start:expr, $num_bits:expr) => {
        ($byte >> $start) & (((1u16 << $num_bits) - 1) as u8)
    };
}

macro_rules! define_field {
    // Bit ranges spread over several bytes, most significant part first.
    ($name:ident, $type:ty, [ $( ( $offset:expr, $start_bit:expr, $num_bits:expr ) ),+ ]) => {
        doc_comment::doc_comment! {
            concat!("The `", stringify!($name), "` field, pieced together from bit ranges."),
            pub fn $name(&self) -> $type {
                let mut value: $type = 0;
                $(
                    value = (value << $num_bits) | (bits!(self.data()[$offset], $start_bit, $num_bits) as $type);
                )+
                value
            }
        }
    };

    ($name:ident, bool, $offset:expr, $bit:expr) => {
        doc_comment::doc_comment! {
            concat!("Bit ", stringify!($bit), " of byte ", stringify!($offset), "."),
            pub fn $name(&self) -> bool {
                self.data()[$offset] & (1 << $bit) != 0
            }
        }
    };

    ($name:ident, u8, $offset:expr, $start_bit:expr, $num_bits:expr) => {
        doc_comment::doc_comment! {
            concat!("The `", stringify!($name), "` bits of byte ", stringify!($offset), "."),
            pub fn $name(&self) -> u8 {
                bits!(self.data()[$offset], $start_bit, $num_bits)
            }
        }
    };

    // A little-endian integer at a byte offset.
    ($name:ident, $type:ident, $offset:expr) => {
        doc_comment::doc_comment! {
            concat!("Little-endian `", stringify!($type), "` at byte ", stringify!($offset), "."),
            pub fn $name(&self) -> $type {
                const LEN: usize = core::mem::size_of::<$type>();
                let mut bytes = [0u8; LEN];
                bytes.copy_from_slice(&self.data()[$offset..$offset + LEN]);
                $type::from_le_bytes(bytes)
            }
        }
    };

    ($name:ident, $set_name:ident, $type:ident, $offset:expr) => {
        define_field!($name, $type, $offset);

        doc_comment::doc_comment! {
            concat!("Store the `", stringify!($name), "` field."),
            pub fn $set_name(&mut self, value: $type) {
                let bytes = value.to_le_bytes();
                self.data_mut()[$offset..$offset + bytes.len()].copy_from_slice(&bytes);
            }
        }
    };
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
