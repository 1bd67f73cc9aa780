pub mod candidate;
pub mod endpoint;
pub mod feedback;
pub mod intent;
pub mod report;
pub mod result;

pub use candidate::*;
pub use endpoint::*;
pub use feedback::*;
pub use intent::*;
pub use report::*;
pub use result::*;
