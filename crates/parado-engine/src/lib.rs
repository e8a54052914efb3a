mod boot;
mod packages;

pub use boot::{BootPolicy, boot_interpreter};
pub use packages::{
    DEFAULT_PACKAGE_INDEX, DirPackageSource, HttpPackageSource, PackageSource,
    validate_package_name,
};

use anyhow::{Context as _, Result, anyhow};
use boa_engine::{Context, Source};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives interpreter output in emission order.
pub trait OutputSink {
    fn write(&mut self, stream: Stream, text: &str);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub lines: Vec<(Stream, String)>,
}

impl CapturedOutput {
    pub fn stream(&self, stream: Stream) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

impl OutputSink for CapturedOutput {
    fn write(&mut self, stream: Stream, text: &str) {
        self.lines.push((stream, text.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOutput {
    pub value: Option<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("interpreter runtime unavailable after {attempts} attempt(s): {last_error}")]
    RuntimeUnavailable { attempts: u32, last_error: String },
    #[error("failed evaluating {source_name}: {message}")]
    Execution {
        source_name: String,
        message: String,
    },
}

pub trait Interpreter {
    /// Runs `source` in a fresh global scope with every installed package
    /// available through `require(name)`.
    fn run(
        &mut self,
        source: &str,
        source_name: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<EvalOutput>;

    fn install_package(&mut self, name: &str, source: &str) -> Result<()>;
}

impl<I: Interpreter + ?Sized> Interpreter for Box<I> {
    fn run(
        &mut self,
        source: &str,
        source_name: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<EvalOutput> {
        (**self).run(source, source_name, sink)
    }

    fn install_package(&mut self, name: &str, source: &str) -> Result<()> {
        (**self).install_package(name, source)
    }
}

const CONSOLE_SHIM: &str = r#"
globalThis.__parado_console = [];
(() => {
  const render = (value) => {
    if (typeof value === "string") return value;
    if (typeof value === "object" && value !== null) {
      try {
        return JSON.stringify(value) ?? String(value);
      } catch (_) {
        return String(value);
      }
    }
    return String(value);
  };
  const emit = (stream) => (...args) => {
    globalThis.__parado_console.push({ stream, text: args.map(render).join(" ") });
  };
  globalThis.console = {
    log: emit("stdout"),
    info: emit("stdout"),
    debug: emit("stdout"),
    warn: emit("stderr"),
    error: emit("stderr"),
  };
  globalThis.print = emit("stdout");
})();
globalThis.__parado_drain_console = () => {
  const out = JSON.stringify(globalThis.__parado_console);
  globalThis.__parado_console = [];
  return out;
};
globalThis.__parado_packages = {};
globalThis.require = (name) => {
  if (Object.prototype.hasOwnProperty.call(globalThis.__parado_packages, name)) {
    return globalThis.__parado_packages[name];
  }
  throw new Error(`package '${name}' is not installed`);
};
"#;

const DRAIN_CONSOLE: &str = "typeof globalThis.__parado_drain_console === 'function' ? globalThis.__parado_drain_console() : '[]'";

#[derive(Debug, Deserialize)]
struct ConsoleLine {
    stream: Stream,
    text: String,
}

pub struct BoaInterpreter {
    ctx: Context,
    packages: Vec<(String, String)>,
}

impl BoaInterpreter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            ctx: fresh_context()?,
            packages: Vec::new(),
        })
    }

    pub fn installed_packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(|(name, _)| name.as_str())
    }

    fn reset(&mut self) -> Result<()> {
        self.ctx = fresh_context()?;
        for (name, source) in &self.packages {
            eval_package(&mut self.ctx, name, source)?;
        }
        let mut discarded = CapturedOutput::default();
        drain_console(&mut self.ctx, &mut discarded)?;
        Ok(())
    }
}

fn fresh_context() -> Result<Context> {
    let mut ctx = Context::default();
    ctx.eval(Source::from_bytes(CONSOLE_SHIM))
        .map_err(|err| anyhow!("failed installing console shim: {err}"))?;
    Ok(ctx)
}

fn package_script(name: &str, source: &str) -> Result<String> {
    let key = serde_json::to_string(name).context("failed encoding package name")?;
    Ok(format!(
        "(function () {{\n  const module = {{ exports: {{}} }};\n  (function (module, exports, require) {{\n{source}\n  }})(module, module.exports, globalThis.require);\n  globalThis.__parado_packages[{key}] = module.exports;\n}})();"
    ))
}

fn eval_package(ctx: &mut Context, name: &str, source: &str) -> Result<()> {
    let script = package_script(name, source)?;
    ctx.eval(Source::from_bytes(&script))
        .map_err(|err| anyhow!("failed installing package {name}: {err}"))?;
    Ok(())
}

fn drain_console(ctx: &mut Context, sink: &mut dyn OutputSink) -> Result<()> {
    let drained = ctx
        .eval(Source::from_bytes(DRAIN_CONSOLE))
        .map_err(|err| anyhow!("failed draining console output: {err}"))?;
    let raw = drained
        .to_string(ctx)
        .map_err(|err| anyhow!("failed reading console output: {err}"))?
        .to_std_string_escaped();
    let lines: Vec<ConsoleLine> =
        serde_json::from_str(&raw).context("failed decoding console output")?;
    for line in lines {
        sink.write(line.stream, &line.text);
    }
    Ok(())
}

impl Interpreter for BoaInterpreter {
    fn run(
        &mut self,
        source: &str,
        source_name: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<EvalOutput> {
        self.reset()?;
        tracing::debug!(source_name, bytes = source.len(), "evaluating script");

        let result = self.ctx.eval(Source::from_bytes(source));
        // Output emitted before a throw still belongs to this run.
        drain_console(&mut self.ctx, sink)?;

        let value = result.map_err(|err| EngineError::Execution {
            source_name: source_name.to_string(),
            message: err.to_string(),
        })?;

        if value.is_undefined() {
            return Ok(EvalOutput { value: None });
        }

        let rendered = value
            .to_string(&mut self.ctx)
            .map_err(|err| anyhow!("failed converting JS value to string: {err}"))?
            .to_std_string_escaped();

        Ok(EvalOutput {
            value: Some(rendered),
        })
    }

    fn install_package(&mut self, name: &str, source: &str) -> Result<()> {
        validate_package_name(name)?;
        eval_package(&mut self.ctx, name, source)?;
        let mut init_output = CapturedOutput::default();
        drain_console(&mut self.ctx, &mut init_output)?;
        for (_, text) in &init_output.lines {
            tracing::debug!(package = name, "{text}");
        }
        self.packages.retain(|(existing, _)| existing != name);
        self.packages.push((name.to_string(), source.to_string()));
        tracing::info!(package = name, "package installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BoaInterpreter, CapturedOutput, EngineError, Interpreter, Stream};

    fn run(engine: &mut BoaInterpreter, source: &str) -> (Option<String>, CapturedOutput) {
        let mut out = CapturedOutput::default();
        let eval = engine
            .run(source, "<test>", &mut out)
            .expect("eval should pass");
        (eval.value, out)
    }

    #[test]
    fn evaluates_expression() {
        let mut engine = BoaInterpreter::new().expect("engine should start");
        let (value, _) = run(&mut engine, "1 + 2");
        assert_eq!(value.as_deref(), Some("3"));
    }

    #[test]
    fn suppresses_undefined() {
        let mut engine = BoaInterpreter::new().expect("engine should start");
        let (value, _) = run(&mut engine, "const a = 1;");
        assert_eq!(value, None);
    }

    #[test]
    fn routes_console_streams_in_order() {
        let mut engine = BoaInterpreter::new().expect("engine should start");
        let (_, out) = run(
            &mut engine,
            "console.log('one', 2); console.error('bad'); print({ a: 1 });",
        );
        assert_eq!(
            out.lines,
            vec![
                (Stream::Stdout, "one 2".to_string()),
                (Stream::Stderr, "bad".to_string()),
                (Stream::Stdout, "{\"a\":1}".to_string()),
            ]
        );
    }

    #[test]
    fn output_before_throw_is_kept() {
        let mut engine = BoaInterpreter::new().expect("engine should start");
        let mut out = CapturedOutput::default();
        let err = engine
            .run("console.log('before'); throw new Error('boom')", "sample.js", &mut out)
            .expect_err("expected eval error");
        assert!(err.to_string().contains("failed evaluating sample.js"));
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Execution { .. })
        ));
        assert_eq!(out.stream(Stream::Stdout), vec!["before"]);
    }

    #[test]
    fn each_run_starts_from_a_fresh_scope() {
        let mut engine = BoaInterpreter::new().expect("engine should start");
        run(&mut engine, "const greeting = 'hi';");
        let (value, _) = run(&mut engine, "const greeting = 'again'; greeting");
        assert_eq!(value.as_deref(), Some("again"));
    }

    #[test]
    fn installed_packages_survive_runs() {
        let mut engine = BoaInterpreter::new().expect("engine should start");
        engine
            .install_package("math-utils", "module.exports.double = (n) => n * 2;")
            .expect("install should pass");
        run(&mut engine, "1");
        let (value, _) = run(&mut engine, "require('math-utils').double(21)");
        assert_eq!(value.as_deref(), Some("42"));
        assert_eq!(engine.installed_packages().collect::<Vec<_>>(), vec!["math-utils"]);
    }

    #[test]
    fn requiring_missing_package_fails() {
        let mut engine = BoaInterpreter::new().expect("engine should start");
        let mut out = CapturedOutput::default();
        let err = engine
            .run("require('nope')", "<test>", &mut out)
            .expect_err("must fail");
        assert!(err.to_string().contains("failed evaluating <test>"));
    }

    #[test]
    fn broken_package_is_not_recorded() {
        let mut engine = BoaInterpreter::new().expect("engine should start");
        let err = engine
            .install_package("broken", "throw new Error('init failed')")
            .expect_err("install must fail");
        assert!(err.to_string().contains("failed installing package broken"));
        assert_eq!(engine.installed_packages().count(), 0);
    }
}
