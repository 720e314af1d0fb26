use std::hash::Hash;

/// A key type an index page can store. Keys are encoded at a fixed width so
/// slot offsets inside a page stay computable without a per-slot header.
pub trait IndexKey: Clone + Hash + Send + Sync + 'static {
    /// Width of the encoded key in bytes.
    const ENCODED_LEN: usize;

    /// Encodes the key into the first `ENCODED_LEN` bytes of `buf`.
    fn encode_into(&self, buf: &mut [u8]);

    /// Decodes a key from the first `ENCODED_LEN` bytes of `buf`.
    fn decode_from(buf: &[u8]) -> Self;
}

macro_rules! impl_index_key_for_int {
    ($($t:ty),*) => {
        $(
            impl IndexKey for $t {
                const ENCODED_LEN: usize = std::mem::size_of::<$t>();

                fn encode_into(&self, buf: &mut [u8]) {
                    buf[..Self::ENCODED_LEN].copy_from_slice(&self.to_le_bytes());
                }

                fn decode_from(buf: &[u8]) -> Self {
                    <$t>::from_le_bytes(buf[..Self::ENCODED_LEN].try_into().unwrap())
                }
            }
        )*
    };
}

impl_index_key_for_int!(i32, i64, u32, u64);

/// A generic fixed-width key holding opaque bytes, for indexing columns that
/// are not plain integers. Content shorter than `N` is zero padded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    /// Creates a new `GenericKey` with zeroed data.
    pub fn new() -> Self {
        Self { data: [0; N] }
    }

    /// Sets the key data from a slice of bytes, truncating at `N`.
    pub fn set_from_bytes(&mut self, bytes: &[u8]) {
        self.data = [0; N];
        let len = bytes.len().min(N);
        self.data[..len].copy_from_slice(&bytes[..len]);
    }

    /// Returns a reference to the key's byte data.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> IndexKey for GenericKey<N> {
    const ENCODED_LEN: usize = N;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn decode_from(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self { data }
    }
}
