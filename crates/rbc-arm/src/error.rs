use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("arm is in EmergencyStop or reports a fault state; move refused")]
    ArmBusyOrFaulted,

    #[error("arm move returned failure code {0}")]
    ArmMoveFailed(i32),

    #[error("arm transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("status actor error: {0}")]
    Status(#[from] rbc_status::StatusHandleError),
}
