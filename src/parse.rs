//! Fixed-width sample parsing.
//!
//! Sensor daemons write their samples as packed unsigned
//! integers in the byte order of the machine they run on.
//! [`Parseable`] reads one such value off a
//! [`ByteOrdered`] reader so the decoder can stay generic
//! over the sample width.

use std::io::Error as IOError;

use byteordered::{byteorder::ReadBytesExt, ByteOrdered, Endian};

pub(crate) trait Parseable: Sized + Into<f64> {
    /// Width of one sample in bytes.
    const WIDTH: usize;

    fn parse<T: ReadBytesExt, E: Endian>(r: &mut ByteOrdered<T, E>) -> Result<Self, IOError>;
}

macro_rules! impl_parseable {
    ($ty:ty, $method:ident) => {
        impl Parseable for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn parse<T: ReadBytesExt, E: Endian>(
                r: &mut ByteOrdered<T, E>,
            ) -> Result<Self, IOError> {
                r.$method()
            }
        }
    };
}

impl_parseable!(u8, read_u8);
impl_parseable!(u16, read_u16);
impl_parseable!(u32, read_u32);

/// Parse `count` consecutive samples as floats.
pub(crate) fn parse_samples<P, T, E>(
    r: &mut ByteOrdered<T, E>,
    count: usize,
) -> Result<Vec<f64>, IOError>
where
    P: Parseable,
    T: ReadBytesExt,
    E: Endian,
{
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(P::parse(r)?.into());
    }
    Ok(out)
}
