/// The broadcast engine's own interlock, distinct from
/// [`rbc_status::RoboticsMode`] (the fluidics routine state machine).
/// Guards every exchange over the
/// serial port: a broadcast phase and an immediate dispatch can never
/// run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastState {
    Idle,
    RunningBroadcast,
    RunningImmediate,
}
