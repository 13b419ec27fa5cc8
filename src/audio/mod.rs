pub mod mixer;
pub mod render;
pub mod source;
pub mod wav;
