pub mod geometry;
pub mod measure;
pub mod scripting;
pub mod size_mark;
pub mod stroke;
pub mod text;
