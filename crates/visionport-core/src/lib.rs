pub mod artifact;
pub mod backend;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod modality;
pub mod options;
pub mod spec;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use descriptor::*;
pub use error::*;
pub use fetch::*;
pub use modality::*;
pub use options::*;
pub use spec::*;
pub use tensor::*;
