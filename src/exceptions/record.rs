//! Lazily analyzed exception records.
//!
//! A record is created for every exception that reaches the store, so construction must be
//! cheap. The formatted trace and its fingerprint are computed on first use and cached in a
//! [`OnceLock`]; concurrent first calls block on the same initialization and observe one result.
//! The attribution report is cached the same way.

use std::{
    fmt::Write,
    sync::{Arc, OnceLock},
};

use crate::{
    exceptions::{report, AnalysisContext, CaughtException, ExceptionReport},
    trace::{TraceFingerprint, TraceFormatter},
};

const INNER_TRAILER: &str = "\n   --- End of inner exception stack trace ---";

struct Analysis {
    formatted_trace: String,
    fingerprint: u64,
}

/// One caught exception plus its cached analysis.
///
/// Storage identity is the fingerprint alone: two distinct exception objects that render the
/// same trace text are the same record as far as the [`crate::exceptions::ExceptionStore`] is
/// concerned.
pub struct ExceptionRecord {
    exception: Arc<CaughtException>,
    context: Arc<AnalysisContext>,
    analysis: OnceLock<Analysis>,
    report: OnceLock<ExceptionReport>,
}

impl ExceptionRecord {
    /// Wrap `exception`; no analysis happens yet
    #[must_use]
    pub fn new(exception: Arc<CaughtException>, context: Arc<AnalysisContext>) -> Self {
        ExceptionRecord {
            exception,
            context,
            analysis: OnceLock::new(),
            report: OnceLock::new(),
        }
    }

    /// The wrapped exception
    #[must_use]
    pub fn exception(&self) -> &Arc<CaughtException> {
        &self.exception
    }

    /// Render the trace and compute the fingerprint, once.
    ///
    /// Further calls, from any thread, return without recomputing.
    pub fn analyze(&self) {
        let _ = self.analysis();
    }

    /// Hash of [`ExceptionRecord::formatted_trace`]; never changes once computed
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.analysis().fingerprint
    }

    /// The full trace text, including the headline and patch attribution lines
    #[must_use]
    pub fn formatted_trace(&self) -> &str {
        &self.analysis().formatted_trace
    }

    /// Which modules touched the failing call path
    #[must_use]
    pub fn report(&self) -> &ExceptionReport {
        self.report
            .get_or_init(|| report::build(&self.exception, &self.context))
    }

    fn analysis(&self) -> &Analysis {
        self.analysis.get_or_init(|| {
            let formatted_trace = self.render();
            let fingerprint = TraceFingerprint::of(&formatted_trace);
            Analysis {
                formatted_trace,
                fingerprint,
            }
        })
    }

    fn render(&self) -> String {
        let context = &*self.context;
        let formatter = TraceFormatter::new(&context.inspector, context.host.as_ref())
            .include_cleanup(context.include_cleanup_hooks());
        let exception = &*self.exception;

        let mut out = String::from("Exception");
        if let Some(oldest) = exception.trace.oldest() {
            if let (Some(method), _) = context.inspector.resolve(oldest) {
                let _ = write!(out, " in {}", method.qualified_name());
            }
        }
        let _ = write!(out, ": {}", exception.type_name);

        let message = exception.message_text();
        if !message.is_empty() {
            let _ = write!(out, ": {message}");
        }

        if let Some(inner) = &exception.inner {
            let plain = TraceFormatter::new(&context.inspector, context.host.as_ref()).plain();
            let _ = write!(out, " ---> {}{}", plain_string(inner, &plain), INNER_TRAILER);
        }

        let trace = formatter.format(&exception.trace);
        if !trace.is_empty() {
            out.push('\n');
            out.push_str(&trace);
        }
        out
    }
}

/// The runtime's default rendering of an exception: type, message, inner chain, plain trace.
fn plain_string(exception: &CaughtException, formatter: &TraceFormatter<'_>) -> String {
    let mut out = exception.type_name.clone();
    let message = exception.message_text();
    if !message.is_empty() {
        let _ = write!(out, ": {message}");
    }
    if let Some(inner) = &exception.inner {
        let _ = write!(out, " ---> {}{}", plain_string(inner, formatter), INNER_TRAILER);
    }
    let trace = formatter.format(&exception.trace);
    if !trace.is_empty() {
        out.push('\n');
        out.push_str(&trace);
    }
    out
}

impl PartialEq for ExceptionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for ExceptionRecord {}

impl std::hash::Hash for ExceptionRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}

impl std::fmt::Debug for ExceptionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionRecord")
            .field("type_name", &self.exception.type_name)
            .field("fingerprint", &self.analysis.get().map(|a| a.fingerprint))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        inspector::FrameInspector,
        patches::{ActiveOwners, PatchRegistry},
        settings::Settings,
        test::{host, method_in, module, registry_with_replacement},
        trace::{CallFrame, StackSnapshot},
    };
    use std::sync::RwLock;

    fn context(registry: Arc<PatchRegistry>) -> Arc<AnalysisContext> {
        Arc::new(AnalysisContext {
            inspector: FrameInspector::new(registry),
            host: Arc::new(host()),
            owners: Arc::new(ActiveOwners::new()),
            own_module: module("patchscope"),
            settings: Arc::new(RwLock::new(Settings::default())),
        })
    }

    fn failing_tick(replacement: crate::metadata::method::MethodDescriptor) -> CaughtException {
        CaughtException::new("System.NullReferenceException")
            .with_message("Object reference not set to an instance of an object")
            .with_trace(StackSnapshot::new(vec![
                CallFrame::managed(replacement, 0x10).at("Pawn.cs", 12),
                CallFrame::managed(method_in("Host", "Verse", "TickManager", "DoTick"), 0x3)
                    .at("TickManager.cs", 80),
            ]))
    }

    #[test]
    fn formatted_trace_layout() {
        let (registry, replacement) = registry_with_replacement();
        let record = ExceptionRecord::new(Arc::new(failing_tick(replacement)), context(registry));

        let text = record.formatted_trace();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Exception in Verse.TickManager.DoTick: System.NullReferenceException: Object reference not set to an instance of an object")
        );
        assert_eq!(
            lines.next(),
            Some("  at Verse.Pawn.Tick () [0x00010] in Pawn.cs:12 ")
        );
        assert_eq!(
            lines.next(),
            Some("     - transpiler cool.mod: Void CoolMod.Patches:Transpiler()")
        );
        assert_eq!(
            lines.next(),
            Some("     - prefix cool.mod: Void CoolMod.Patches:Prefix()")
        );
        assert_eq!(
            lines.next(),
            Some("     - postfix cool.mod: Void CoolMod.Patches:Postfix()")
        );
        assert_eq!(
            lines.next(),
            Some("  at Verse.TickManager.DoTick () [0x00003] in TickManager.cs:80 ")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn inner_exception_continuation() {
        let registry = Arc::new(PatchRegistry::new());
        let exception = CaughtException::new("MyApp.MyError")
            .with_message("bad value")
            .with_inner(
                CaughtException::new("MyApp.RootError")
                    .with_message("root cause")
                    .with_trace(StackSnapshot::new(vec![CallFrame::managed(
                        method_in("Host", "MyApp", "Parser", "Parse"),
                        1,
                    )
                    .at("Parser.cs", 9)])),
            );
        let record = ExceptionRecord::new(Arc::new(exception), context(registry));

        assert_eq!(
            record.formatted_trace(),
            "Exception: MyApp.MyError: bad value ---> MyApp.RootError: root cause\n  \
             at MyApp.Parser.Parse () [0x00001] in Parser.cs:9 \
             \n   --- End of inner exception stack trace ---"
        );
    }

    #[test]
    fn analysis_is_idempotent() {
        let (registry, replacement) = registry_with_replacement();
        let record = ExceptionRecord::new(Arc::new(failing_tick(replacement)), context(registry));

        record.analyze();
        let fingerprint = record.fingerprint();
        let trace = record.formatted_trace().to_string();
        for _ in 0..3 {
            record.analyze();
            assert_eq!(record.fingerprint(), fingerprint);
            assert_eq!(record.formatted_trace(), trace);
        }
        assert!(std::ptr::eq(record.report(), record.report()));
    }

    #[test]
    fn identical_traces_share_fingerprint() {
        let (registry, replacement) = registry_with_replacement();
        let ctx = context(registry);
        let first = ExceptionRecord::new(Arc::new(failing_tick(replacement.clone())), ctx.clone());
        let second = ExceptionRecord::new(Arc::new(failing_tick(replacement)), ctx);

        assert_eq!(first, second);
        assert_eq!(first.formatted_trace(), second.formatted_trace());
    }

    #[test]
    fn missing_message_and_stack_degrade() {
        let record = ExceptionRecord::new(
            Arc::new(CaughtException::new("System.Exception")),
            context(Arc::new(PatchRegistry::new())),
        );
        assert_eq!(record.formatted_trace(), "Exception: System.Exception");
    }
}
