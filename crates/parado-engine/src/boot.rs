use crate::{EngineError, Interpreter, PackageSource};
use anyhow::{Context, Result};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for BootPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

fn boot_once<I, F>(factory: &mut F, preload: &[String], packages: &dyn PackageSource) -> Result<I>
where
    I: Interpreter,
    F: FnMut() -> Result<I>,
{
    let mut interpreter = factory().context("failed creating interpreter")?;
    for name in preload {
        let source = packages
            .fetch(name)
            .with_context(|| format!("failed loading preload package {name}"))?;
        interpreter.install_package(name, &source)?;
    }
    Ok(interpreter)
}

/// Creates an interpreter and installs `preload`, retrying the whole sequence.
pub fn boot_interpreter<I, F>(
    mut factory: F,
    preload: &[String],
    packages: &dyn PackageSource,
    policy: &BootPolicy,
) -> Result<I, EngineError>
where
    I: Interpreter,
    F: FnMut() -> Result<I>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match boot_once(&mut factory, preload, packages) {
            Ok(interpreter) => {
                tracing::info!(attempt, packages = preload.len(), "interpreter ready");
                return Ok(interpreter);
            }
            Err(err) => {
                last_error = format!("{err:#}");
                tracing::warn!(attempt, attempts, error = %last_error, "interpreter boot failed");
                if attempt < attempts {
                    thread::sleep(policy.delay);
                }
            }
        }
    }

    Err(EngineError::RuntimeUnavailable {
        attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::{BootPolicy, boot_interpreter};
    use crate::{BoaInterpreter, CapturedOutput, EngineError, Interpreter, PackageSource};
    use anyhow::{Result, anyhow};
    use std::collections::HashMap;
    use std::time::Duration;

    struct MapSource(HashMap<String, String>);

    impl PackageSource for MapSource {
        fn fetch(&self, name: &str) -> Result<String> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("no package {name}"))
        }
    }

    fn quick() -> BootPolicy {
        BootPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn retries_until_factory_succeeds() {
        let mut calls = 0;
        let source = MapSource(HashMap::new());
        let booted = boot_interpreter(
            || {
                calls += 1;
                if calls < 3 {
                    return Err(anyhow!("loader not ready"));
                }
                BoaInterpreter::new()
            },
            &[],
            &source,
            &quick(),
        );
        assert!(booted.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhausted_attempts_report_runtime_unavailable() {
        let source = MapSource(HashMap::new());
        let err = boot_interpreter::<BoaInterpreter, _>(
            || Err(anyhow!("script failed to load")),
            &[],
            &source,
            &quick(),
        )
        .err()
        .expect("boot must fail");
        match err {
            EngineError::RuntimeUnavailable {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("script failed to load"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn preload_packages_are_installed() {
        let source = MapSource(HashMap::from([(
            "answer".to_string(),
            "module.exports = 42;".to_string(),
        )]));
        let mut engine: BoaInterpreter = boot_interpreter(
            BoaInterpreter::new,
            &["answer".to_string()],
            &source,
            &quick(),
        )
        .expect("boot should pass");
        let mut out = CapturedOutput::default();
        let eval = engine
            .run("require('answer')", "<test>", &mut out)
            .expect("run should pass");
        assert_eq!(eval.value.as_deref(), Some("42"));
    }

    #[test]
    fn missing_preload_package_fails_boot() {
        let source = MapSource(HashMap::new());
        let err = boot_interpreter(
            BoaInterpreter::new,
            &["ghost".to_string()],
            &source,
            &BootPolicy {
                attempts: 1,
                delay: Duration::from_millis(1),
            },
        )
        .err()
        .expect("boot must fail");
        assert!(err.to_string().contains("failed loading preload package ghost"));
    }
}
