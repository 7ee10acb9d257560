//! Process exit codes.
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Runtime failure (data, training, IO) |
//! | 2 | Configuration or parameter error |

use molgap_chem::ChemError;
use molgap_learn::LearnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CliExitCode {
    Success = 0,
    Failure = 1,
    Config = 2,
}

impl From<CliExitCode> for i32 {
    fn from(code: CliExitCode) -> Self {
        code as i32
    }
}

pub fn exit_code_for_error(e: &LearnError) -> CliExitCode {
    match e {
        LearnError::ConfigError { .. } => CliExitCode::Config,
        LearnError::Chem(ChemError::InvalidParameter { .. }) => CliExitCode::Config,
        _ => CliExitCode::Failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_exit_2() {
        let e = LearnError::ConfigError {
            message: "bad".to_string(),
        };
        assert_eq!(i32::from(exit_code_for_error(&e)), 2);

        let e = LearnError::Chem(ChemError::InvalidParameter {
            name: "width",
            message: "must be >= 1".to_string(),
        });
        assert_eq!(exit_code_for_error(&e), CliExitCode::Config);
    }

    #[test]
    fn test_runtime_errors_exit_1() {
        let cases = [
            LearnError::EmptyDataset {
                context: "target".to_string(),
            },
            LearnError::TrainingDivergence {
                epoch: 3,
                stage: "train",
                value: f32::NAN,
            },
            LearnError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x")),
            LearnError::Chem(ChemError::MalformedInput {
                descriptor: "C1CC(".to_string(),
                reason: "unclosed".to_string(),
            }),
        ];
        for e in &cases {
            assert_eq!(i32::from(exit_code_for_error(e)), 1, "{e}");
        }
    }

    #[test]
    fn test_success_is_zero() {
        assert_eq!(i32::from(CliExitCode::Success), 0);
    }
}
