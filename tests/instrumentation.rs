//! Integration tests for startup instrumentation through a [`Session`].
//!
//! A fake host provides a handful of method bodies; the tests check which ones get rewritten,
//! what the rewritten streams look like, and that the registry attributes them to the engine.

use patchscope::{
    instrumentation::{HandlerStart, InstrumentationState},
    metadata::method::Label,
    prelude::*,
    Result,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

const HOST: &str = "Assembly-CSharp";

struct FakeHost {
    bodies: HashMap<MethodDescriptor, MethodBody>,
    installed: Mutex<HashMap<MethodDescriptor, MethodBody>>,
}

impl FakeHost {
    fn new(bodies: Vec<(MethodDescriptor, MethodBody)>) -> Self {
        FakeHost {
            bodies: bodies.into_iter().collect(),
            installed: Mutex::new(HashMap::new()),
        }
    }

    fn installed(&self, method: &MethodDescriptor) -> Option<MethodBody> {
        self.installed.lock().unwrap().get(method).cloned()
    }
}

impl MethodSource for FakeHost {
    fn candidates(&self) -> Vec<MethodDescriptor> {
        self.bodies.keys().cloned().collect()
    }

    fn body(&self, method: &MethodDescriptor) -> Result<MethodBody> {
        self.bodies
            .get(method)
            .cloned()
            .ok_or_else(|| Error::MissingBody(method.qualified_name()))
    }

    fn install(&self, method: &MethodDescriptor, body: MethodBody) -> Result<()> {
        self.installed.lock().unwrap().insert(method.clone(), body);
        Ok(())
    }

    fn is_definition_type(&self, type_name: &TypeName) -> bool {
        type_name.namespace == "Verse" && type_name.name.ends_with("Def")
    }
}

fn exception_type() -> TypeName {
    TypeName::new("System", "Exception")
}

fn own(name: &str) -> MethodDescriptor {
    MethodDescriptor::new(TypeName::new("Patchscope", "Hooks"), name)
        .in_module(ModuleId::named("patchscope"))
        .static_method()
}

fn activator() -> MethodDescriptor {
    MethodDescriptor::new(TypeName::new("System", "Activator"), "CreateInstance")
        .returns(TypeName::new("System", "Object"))
        .parameter(TypeName::new("System", "Type"), "type")
        .static_method()
}

fn targets() -> InstrumentationTargets {
    InstrumentationTargets::new("patchscope", own("Handle"), own("Transpiler"))
        .namespace("Verse.")
        .namespace("RimWorld.")
        .redirect(activator(), own("CreateInstance"))
}

fn host_method(namespace: &str, type_name: &str, name: &str) -> MethodDescriptor {
    MethodDescriptor::new(TypeName::new(namespace, type_name), name).in_module(ModuleId::named(HOST))
}

fn try_catch(first_handler_instruction: OpCode) -> MethodBody {
    MethodBody::new(
        vec![
            Instruction::new(OpCode::Nop),
            Instruction::with_operand(OpCode::Leave, Operand::Target(Label(1))),
            Instruction::new(first_handler_instruction),
            Instruction::with_operand(OpCode::Leave, Operand::Target(Label(1))),
            Instruction::new(OpCode::Ret).labeled(Label(1)),
        ],
        vec![ExceptionHandler::catch(0..2, 2..4, exception_type())],
    )
}

/// Catch-all handlers route to the store; pop-first handlers and foreign namespaces are left alone.
#[test]
fn test_startup_rewrites_selected_methods() -> Result<()> {
    let load = host_method("Verse", "DirectXmlLoader", "Load");
    let discard = host_method("Verse", "Log", "Quietly");
    let foreign = host_method("UnityEngine", "Object", "Destroy");
    let host = FakeHost::new(vec![
        (load.clone(), try_catch(OpCode::Stloc)),
        (discard.clone(), try_catch(OpCode::Pop)),
        (foreign.clone(), try_catch(OpCode::Stloc)),
    ]);

    let session = Session::builder(targets())
        .host(Arc::new(HostModules::new([HOST])))
        .settings(Settings::first_run())
        .build();
    let summary = session.startup(&host).expect("first startup scans");

    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.instrumented, 1);
    assert_eq!(summary.catch_sites, 1);
    assert_eq!(session.engine().state(), InstrumentationState::Patched);

    let body = host.installed(&load).expect("rewritten body installed");
    assert_eq!(body.instructions[2].called_method(), Some(&own("Handle")));
    assert_eq!(body.exception_handlers[0].handler_start, 2);
    assert_eq!(
        HandlerStart::classify(&try_catch(OpCode::Pop).instructions[2]),
        HandlerStart::DiscardsException
    );
    assert!(host.installed(&discard).is_none());
    assert!(host.installed(&foreign).is_none());

    let patches = session.registry().patch_set_for(&load);
    assert_eq!(patches.return_filters.len(), 1);
    assert_eq!(patches.return_filters[0].owner, "patchscope");
    assert_eq!(patches.return_filters[0].priority, i32::MAX);
    Ok(())
}

/// Activation calls in a static method receive the first definition parameter as context.
#[test]
fn test_activator_redirect_in_static_method() -> Result<()> {
    let make = host_method("RimWorld", "CompMaker", "Make")
        .parameter(TypeName::new("System", "Int32"), "count")
        .parameter(TypeName::new("Verse", "ThingDef"), "def")
        .static_method();
    let body = MethodBody::new(
        vec![
            Instruction::with_operand(OpCode::Ldloc, Operand::Local(0)),
            Instruction::call(activator()),
            Instruction::new(OpCode::Ret),
        ],
        Vec::new(),
    );
    let host = FakeHost::new(vec![(make.clone(), body)]);

    let session = Session::builder(targets())
        .settings(Settings::first_run())
        .build();
    let summary = session.startup(&host).expect("first startup scans");
    assert_eq!(summary.activator_sites, 1);

    let body = host.installed(&make).expect("rewritten body installed");
    assert_eq!(body.instructions[1].operand, Operand::Argument(1));
    assert_eq!(body.instructions[2].called_method(), Some(&own("CreateInstance")));
    Ok(())
}

/// An instrumented method's own frame shows the engine as a transpiler in captured traces.
#[test]
fn test_instrumented_frames_are_attributed() -> Result<()> {
    let load = host_method("Verse", "DirectXmlLoader", "Load");
    let host = FakeHost::new(vec![(load.clone(), try_catch(OpCode::Stloc))]);
    let session = Session::builder(targets())
        .host(Arc::new(HostModules::new([HOST])))
        .own_module(ModuleId::named("patchscope"))
        .settings(Settings::first_run())
        .build();
    session.startup(&host);

    session.store().handle(Arc::new(
        CaughtException::new("System.FormatException")
            .with_message("bad xml")
            .with_trace(StackSnapshot::new(vec![
                CallFrame::managed(load, 0x8).at("DirectXmlLoader.cs", 55)
            ])),
    ));

    let entries = session.store().entries();
    let record = &entries[0].record;
    assert!(record
        .formatted_trace()
        .contains("\n     - transpiler patchscope: Void Patchscope.Hooks:Transpiler()"));
    assert!(record.report().owner_groups.is_empty());
    assert_eq!(
        record.report().top_method.as_ref().map(|m| m.name.as_str()),
        Some("Transpiler")
    );
    Ok(())
}

/// A disabled session leaves the host untouched.
#[test]
fn test_disabled_session_skips_startup() -> Result<()> {
    let load = host_method("Verse", "DirectXmlLoader", "Load");
    let host = FakeHost::new(vec![(load.clone(), try_catch(OpCode::Stloc))]);
    let session = Session::builder(targets()).build();

    assert!(session.startup(&host).is_none());
    assert!(host.installed(&load).is_none());
    assert!(session.registry().patched_methods().is_empty());
    Ok(())
}
