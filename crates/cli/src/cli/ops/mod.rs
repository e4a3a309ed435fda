pub mod export;
pub mod keygen;
pub mod normalize;
pub mod version;

pub use export::Export;
pub use keygen::Keygen;
pub use normalize::Normalize;
pub use version::Version;
