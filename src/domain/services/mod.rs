pub mod activity_codec;
pub mod analyser;
mod envelope;
mod runestone;

pub use analyser::{Analyser, EnvelopeAnalyser, ANALYSER_VERSION};
