pub mod load_use_case;
pub mod ports;
pub mod verify_use_case;

pub use load_use_case::{LoadReport, LoadUseCase, SetReport};
pub use verify_use_case::{VerifyReport, VerifyUseCase};
