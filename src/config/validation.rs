use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("engine.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("engine.channel_size must be at least 1")]
    ZeroChannelSize,

    #[error("engine.safety_timeout_secs must be positive")]
    ZeroSafetyTimeout,

    #[error("scan.batch_lines must be at least 1")]
    ZeroBatchLines,

    #[error("scan.avg_line_bytes must be at least 1")]
    ZeroAvgLineBytes,

    #[error("scan.memory_threshold_pct must be in 1..=100, got {0}")]
    MemoryThresholdOutOfRange(u8),

    #[error("scan.min_progress_step must be in 1..=100, got {0}")]
    ProgressStepOutOfRange(u8),

    #[error("scan.read_buffer must be positive")]
    ZeroReadBuffer,

    #[error("retrieval.max_attempts must be at least 1")]
    ZeroRetrievalAttempts,

    #[error("retrieval.scratch_dir must not be empty")]
    EmptyScratchDir,
}

pub fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.engine.concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }
    if config.engine.channel_size == 0 {
        return Err(ValidationError::ZeroChannelSize);
    }
    if config.engine.safety_timeout_secs == 0 {
        return Err(ValidationError::ZeroSafetyTimeout);
    }
    if config.scan.batch_lines == 0 {
        return Err(ValidationError::ZeroBatchLines);
    }
    if config.scan.avg_line_bytes == 0 {
        return Err(ValidationError::ZeroAvgLineBytes);
    }
    if !(1..=100).contains(&config.scan.memory_threshold_pct) {
        return Err(ValidationError::MemoryThresholdOutOfRange(
            config.scan.memory_threshold_pct,
        ));
    }
    if !(1..=100).contains(&config.scan.min_progress_step) {
        return Err(ValidationError::ProgressStepOutOfRange(
            config.scan.min_progress_step,
        ));
    }
    if config.scan.read_buffer.as_u64() == 0 {
        return Err(ValidationError::ZeroReadBuffer);
    }
    if config.retrieval.max_attempts == 0 {
        return Err(ValidationError::ZeroRetrievalAttempts);
    }
    if config.retrieval.scratch_dir.as_os_str().is_empty() {
        return Err(ValidationError::EmptyScratchDir);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.engine.concurrency = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroConcurrency)
        ));
    }

    #[test]
    fn test_memory_threshold_bounds() {
        let mut config = Config::default();
        config.scan.memory_threshold_pct = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MemoryThresholdOutOfRange(0))
        ));

        config.scan.memory_threshold_pct = 101;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MemoryThresholdOutOfRange(101))
        ));

        config.scan.memory_threshold_pct = 100;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_retrieval_attempts_rejected() {
        let mut config = Config::default();
        config.retrieval.max_attempts = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroRetrievalAttempts)
        ));
    }
}
