//! Message-normalization pipeline: matcher chain, timestamp resolution and
//! hostname validation, composed by [`normalize`].

pub mod hostname;
pub mod matchers;
pub mod normalize;
pub mod timestamp;

pub use normalize::normalize;
