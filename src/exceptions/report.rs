//! Owner attribution for one exception chain.

use std::{collections::HashSet, fmt};

use crate::{
    exceptions::{AnalysisContext, CaughtException},
    metadata::method::{MethodDescriptor, ModuleId},
    patches::{ModificationKind, PatchRegistry},
};

/// A contiguous run of attributed methods from one code module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerGroup {
    /// The module owning every method of the run
    pub owner: ModuleId,
    /// Patch owner id the module registered, if known
    pub owner_token: Option<String>,
    /// Attributed methods, never empty
    pub methods: Vec<MethodDescriptor>,
}

impl OwnerGroup {
    /// Returns `true` once the owner no longer has modifications installed, i.e. after an
    /// "unpatch" action on this group. Groups without a known owner id count as unpatched.
    #[must_use]
    pub fn is_unpatched(&self, registry: &PatchRegistry) -> bool {
        self.owner_token
            .as_deref()
            .map_or(true, |token| !registry.has_owner(token))
    }
}

/// Structured summary of who touched the failing call path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionReport {
    /// `Type: message ---> InnerType: inner message`
    pub headline_message: String,
    /// First method encountered by the attribution walk
    pub top_method: Option<MethodDescriptor>,
    /// Owners in walk order; equal neighbours are merged, distant ones are not
    pub owner_groups: Vec<OwnerGroup>,
}

impl fmt::Display for ExceptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.headline_message)?;
        if let Some(method) = &self.top_method {
            writeln!(f, "in {}", method.short_description())?;
        }
        for (index, group) in self.owner_groups.iter().enumerate() {
            write!(f, "{:>3}. {}", index + 1, group.owner)?;
            if let Some(token) = &group.owner_token {
                write!(f, " [{token}]")?;
            }
            writeln!(f)?;
            for method in &group.methods {
                writeln!(f, "       {}", method.short_description())?;
            }
        }
        Ok(())
    }
}

/// Build the report for `exception` and everything it wraps.
pub(crate) fn build(exception: &CaughtException, context: &AnalysisContext) -> ExceptionReport {
    let mut walk = Vec::new();
    collect_methods(exception, context, &mut walk);

    let mut seen = HashSet::new();
    let mut top_method = None;
    let mut owner_groups: Vec<OwnerGroup> = Vec::new();
    let mut last_module: Option<ModuleId> = None;

    for method in walk {
        if !seen.insert(method.clone()) {
            continue;
        }
        if top_method.is_none() {
            top_method = Some(method.clone());
        }
        if method.module == context.own_module {
            continue;
        }

        let module = method.module.clone();
        match owner_groups.last_mut() {
            Some(group) if last_module.as_ref() == Some(&module) => group.methods.push(method),
            _ => owner_groups.push(OwnerGroup {
                owner_token: context.owners.token_for(&module),
                owner: module.clone(),
                methods: vec![method],
            }),
        }
        last_module = Some(module);
    }

    ExceptionReport {
        headline_message: headline(exception),
        top_method,
        owner_groups,
    }
}

/// Attribution walk order: inner exception first, then per frame the hooks in
/// [`ModificationKind::ATTRIBUTION_ORDER`] followed by the frame's own method.
fn collect_methods(
    exception: &CaughtException,
    context: &AnalysisContext,
    walk: &mut Vec<MethodDescriptor>,
) {
    if let Some(inner) = &exception.inner {
        collect_methods(inner, context, walk);
    }

    let include_cleanup = context.include_cleanup_hooks();
    let host = context.host.as_ref();
    for frame in &exception.trace.frames {
        let (method, patches) = context.inspector.resolve(frame);
        let Some(method) = method else {
            continue;
        };

        for kind in ModificationKind::ATTRIBUTION_ORDER {
            if kind == ModificationKind::Cleanup && !include_cleanup {
                continue;
            }
            walk.extend(
                patches
                    .of_kind(kind)
                    .iter()
                    .filter(|modification| !host.is_host_module(&modification.method.module))
                    .map(|modification| modification.method.clone()),
            );
        }

        if !host.is_host_module(&method.module) {
            walk.push(method);
        }
    }
}

fn headline(exception: &CaughtException) -> String {
    let mut text = exception.type_name.clone();
    let message = exception.message_text().trim();
    if !message.is_empty() {
        text.push_str(": ");
        text.push_str(message);
    }
    if let Some(inner) = &exception.inner {
        text.push_str(" ---> ");
        text.push_str(&headline(inner));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        inspector::FrameInspector,
        patches::ActiveOwners,
        settings::Settings,
        test::{host, method_in, module, registry_with_replacement},
        trace::{CallFrame, StackSnapshot},
    };
    use std::sync::{Arc, RwLock};

    fn context_with(
        registry: Arc<PatchRegistry>,
        owners: Arc<ActiveOwners>,
        include_cleanup_hooks: bool,
    ) -> AnalysisContext {
        AnalysisContext {
            inspector: FrameInspector::new(registry),
            host: Arc::new(host()),
            owners,
            own_module: module("patchscope"),
            settings: Arc::new(RwLock::new(Settings {
                include_cleanup_hooks,
                ..Settings::default()
            })),
        }
    }

    fn frames(methods: Vec<MethodDescriptor>) -> StackSnapshot {
        StackSnapshot::new(
            methods
                .into_iter()
                .map(|method| CallFrame::managed(method, 0))
                .collect(),
        )
    }

    #[test]
    fn non_contiguous_owners_are_not_merged() {
        let context = context_with(
            Arc::new(PatchRegistry::new()),
            Arc::new(ActiveOwners::new()),
            false,
        );
        let exception = CaughtException::new("System.Exception").with_trace(frames(vec![
            method_in("ModA", "A", "First", "Run"),
            method_in("ModA", "A", "Second", "Run"),
            method_in("ModB", "B", "Only", "Run"),
            method_in("ModA", "A", "Third", "Run"),
        ]));

        let report = build(&exception, &context);
        let owners: Vec<&str> = report
            .owner_groups
            .iter()
            .map(|group| group.owner.name.as_str())
            .collect();
        assert_eq!(owners, ["ModA", "ModB", "ModA"]);
        assert_eq!(report.owner_groups[0].methods.len(), 2);
        assert!(report.owner_groups.iter().all(|g| !g.methods.is_empty()));
    }

    #[test]
    fn headline_recurses_into_inner_exception() {
        let exception = CaughtException::new("MyApp.MyError")
            .with_message("bad value")
            .with_inner(CaughtException::new("MyApp.RootError").with_message("  root cause\n"));

        assert_eq!(
            headline(&exception),
            "MyApp.MyError: bad value ---> MyApp.RootError: root cause"
        );
        assert_eq!(headline(&CaughtException::new("System.Exception")), "System.Exception");
    }

    #[test]
    fn hooks_precede_frame_method_and_host_is_skipped() {
        let (registry, replacement) = registry_with_replacement();
        let owners = Arc::new(ActiveOwners::new());
        owners.remember(module("CoolMod"), "cool.mod");
        let context = context_with(registry, owners, false);

        let exception = CaughtException::new("System.Exception").with_trace(frames(vec![
            replacement,
            method_in("Host", "Verse", "TickManager", "DoTick"),
        ]));
        let report = build(&exception, &context);

        let top = report.top_method.as_ref().map(|m| m.name.as_str());
        assert_eq!(top, Some("Postfix"));
        assert_eq!(report.owner_groups.len(), 1);
        let group = &report.owner_groups[0];
        assert_eq!(group.owner_token.as_deref(), Some("cool.mod"));
        let names: Vec<&str> = group.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Postfix", "Prefix", "Transpiler"]);
    }

    #[test]
    fn cleanup_hooks_attributed_when_enabled() {
        let (registry, replacement) = registry_with_replacement();
        let context = context_with(registry, Arc::new(ActiveOwners::new()), true);
        let exception =
            CaughtException::new("System.Exception").with_trace(frames(vec![replacement]));

        let report = build(&exception, &context);
        let names: Vec<&str> = report.owner_groups[0]
            .methods
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, ["Finalizer", "Postfix", "Prefix", "Transpiler"]);
    }

    #[test]
    fn own_module_neither_groups_nor_breaks_runs() {
        let context = context_with(
            Arc::new(PatchRegistry::new()),
            Arc::new(ActiveOwners::new()),
            false,
        );
        let exception = CaughtException::new("System.Exception").with_trace(frames(vec![
            method_in("patchscope", "Patchscope", "Store", "Handle"),
            method_in("ModA", "A", "First", "Run"),
            method_in("patchscope", "Patchscope", "Store", "Record"),
            method_in("ModA", "A", "Second", "Run"),
        ]));

        let report = build(&exception, &context);
        assert_eq!(
            report.top_method.as_ref().map(|m| m.name.as_str()),
            Some("Handle")
        );
        assert_eq!(report.owner_groups.len(), 1);
        assert_eq!(report.owner_groups[0].methods.len(), 2);
    }

    #[test]
    fn inner_exception_is_walked_first_and_methods_deduplicated() {
        let context = context_with(
            Arc::new(PatchRegistry::new()),
            Arc::new(ActiveOwners::new()),
            false,
        );
        let shared = method_in("ModA", "A", "Shared", "Run");
        let exception = CaughtException::new("Outer")
            .with_trace(frames(vec![
                shared.clone(),
                method_in("ModB", "B", "Outer", "Run"),
            ]))
            .with_inner(
                CaughtException::new("Inner").with_trace(frames(vec![
                    method_in("ModC", "C", "Inner", "Run"),
                    shared,
                ])),
            );

        let report = build(&exception, &context);
        let owners: Vec<&str> = report
            .owner_groups
            .iter()
            .map(|group| group.owner.name.as_str())
            .collect();
        assert_eq!(owners, ["ModC", "ModA", "ModB"]);
        assert_eq!(
            report.top_method.as_ref().map(|m| m.name.as_str()),
            Some("Run")
        );
        assert_eq!(
            report.top_method.as_ref().map(|m| m.declaring_type.name.as_str()),
            Some("Inner")
        );
    }

    #[test]
    fn unpatched_after_owner_removed() {
        let (registry, _) = registry_with_replacement();
        let group = OwnerGroup {
            owner: module("CoolMod"),
            owner_token: Some("cool.mod".to_string()),
            methods: vec![method_in("CoolMod", "CoolMod", "Patches", "Prefix")],
        };
        assert!(!group.is_unpatched(&registry));
        registry.uninstall_owner("cool.mod");
        assert!(group.is_unpatched(&registry));
    }

    #[test]
    fn display_lists_numbered_owners() {
        let report = ExceptionReport {
            headline_message: "System.Exception: boom".to_string(),
            top_method: Some(method_in("ModA", "A", "First", "Run")),
            owner_groups: vec![OwnerGroup {
                owner: module("ModA"),
                owner_token: Some("mod.a".to_string()),
                methods: vec![method_in("ModA", "A", "First", "Run")],
            }],
        };
        assert_eq!(
            report.to_string(),
            "System.Exception: boom\nin First.Run ()\n  1. ModA [mod.a]\n       First.Run ()\n"
        );
    }
}
