pub mod lines;
pub mod modules;

pub use lines::LinesCollection;
pub use modules::ModulesCollection;
