pub mod classifier;
pub mod intent;
pub mod text;
