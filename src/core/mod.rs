// Domain-layer modules and shared errors/models
pub mod matcher {
    pub use crate::matcher::*;
}

pub mod lookup {
    pub use crate::lookup::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod summary {
    pub use crate::summary::*;
}

pub mod errors {
    pub use crate::errors::*;
}
