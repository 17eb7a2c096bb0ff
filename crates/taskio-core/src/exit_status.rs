//! POSIX wait status translation

/// Translate a raw `wait(2)` status into a shell-style exit code
///
/// A process killed by signal `n` yields `128 + n`; a process that exited
/// normally yields its exit code from the high byte.
pub fn exit_code_from_wait_status(status: i32) -> i32 {
    let signal = status & 0x7f;
    if signal != 0 {
        signal + 128
    } else {
        status >> 8
    }
}
