pub mod cdf;
pub mod centroids;
pub mod quantile;
pub mod test_helpers;
pub mod wire;

// Internal building blocks
mod compressor;
mod digest;
mod merges;
mod scale;

// Public surface
pub use centroids::Centroid;
pub use digest::{DigestInfo, TDigest, TDigestBuilder, EMPTY_MAX, EMPTY_MIN, MAX_COMPRESSION};
pub use scale::ScaleFamily;
