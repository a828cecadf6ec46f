/// Admission predicate: may a job with this ceiling start while `running`
/// jobs occupy the queue?
///
/// Without a ceiling admission is unconditional.
pub fn can_admit(running: usize, max_concurrents: Option<usize>) -> bool {
    match max_concurrents {
        Some(limit) => running < limit,
        None => true,
    }
}

/// Retry predicate: should attempt number `attempt` (1-based) be followed by
/// another one?
///
/// Without an attempt ceiling a failure is terminal.
pub fn should_retry(attempt: u32, max_attempts: Option<u32>) -> bool {
    max_attempts.is_some_and(|limit| attempt < limit)
}
