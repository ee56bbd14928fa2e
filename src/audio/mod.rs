pub mod block;
pub mod deck;
pub mod mixer;
pub mod params;
pub mod recorder;
pub mod track;
pub mod transport;
