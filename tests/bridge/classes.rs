//! Native classes constructed from script

use super::create_test_engine;
use jsbind::{BridgeError, ClassId, NativeConstructor, ScriptEngine, Value};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, PartialEq)]
struct SpriteData {
    frame: f64,
}

fn sprite_constructor(seen: Rc<RefCell<Vec<Vec<Value>>>>) -> NativeConstructor {
    Rc::new(move |args: &[Value]| -> Result<Option<Box<dyn Any>>, BridgeError> {
        seen.borrow_mut().push(args.to_vec());
        let frame = args.first().and_then(Value::as_number).unwrap_or(0.0);
        Ok(Some(Box::new(SpriteData { frame })))
    })
}

fn install_sprite(engine: &mut ScriptEngine) -> (ClassId, Rc<RefCell<Vec<Vec<Value>>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let id = engine
        .create_class("Sprite", None, Some(sprite_constructor(seen.clone())))
        .unwrap();
    engine.install_class(id).unwrap();
    (id, seen)
}

#[test]
fn test_construct_from_script() {
    let mut engine = create_test_engine();
    let (_id, seen) = install_sprite(&mut engine);

    assert_eq!(
        engine
            .execute_script("var s = new Sprite(3, 'idle'); s instanceof Sprite")
            .unwrap(),
        Some(Value::Boolean(true))
    );
    assert_eq!(
        *seen.borrow(),
        vec![vec![Value::Number(3.0), Value::String("idle".into())]]
    );
    assert_eq!(
        engine.execute_script("Sprite.name").unwrap(),
        Some(Value::String("Sprite".into()))
    );
}

#[test]
fn test_prototype_methods_are_shared() {
    let mut engine = create_test_engine();
    install_sprite(&mut engine);
    let result = engine
        .execute_script(
            "Sprite.prototype.describe = function () { return 'sprite'; };\n\
             new Sprite().describe()",
        )
        .unwrap();
    assert_eq!(result, Some(Value::String("sprite".into())));
}

#[test]
fn test_parent_prototype_is_chained() {
    let mut engine = create_test_engine();
    let node = engine.create_class("Node", None, None).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sprite = engine
        .create_class("Sprite", Some(node), Some(sprite_constructor(seen)))
        .unwrap();

    // Installing the child installs its parent first.
    engine.install_class(sprite).unwrap();
    assert!(engine.classes().is_installed(node));

    let result = engine
        .execute_script(
            "Node.prototype.kind = function () { return 'node'; };\n\
             var s = new Sprite(1);\n\
             [s instanceof Node, s.kind()].join(',')",
        )
        .unwrap();
    assert_eq!(result, Some(Value::String("true,node".into())));
}

#[test]
fn test_class_finalizer_receives_payload() {
    let mut engine = create_test_engine();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let id = engine
        .create_class("Sprite", None, Some(sprite_constructor(seen)))
        .unwrap();
    let frames = Rc::new(RefCell::new(Vec::new()));
    let sink = frames.clone();
    engine
        .define_class_finalize(
            id,
            Rc::new(move |payload: Box<dyn Any>| {
                if let Ok(data) = payload.downcast::<SpriteData>() {
                    sink.borrow_mut().push(data.frame);
                }
            }),
        )
        .unwrap();
    engine.install_class(id).unwrap();

    engine.execute_script("void new Sprite(7)").unwrap();
    engine.collect_garbage();

    assert_eq!(*frames.borrow(), vec![7.0]);
}

#[test]
fn test_constructor_error_becomes_script_exception() {
    let mut engine = create_test_engine();
    let ctor: NativeConstructor = Rc::new(|args: &[Value]| -> Result<Option<Box<dyn Any>>, BridgeError> {
        if args.is_empty() {
            return Err(BridgeError::engine("texture name required"));
        }
        Ok(None)
    });
    let id = engine.create_class("Texture", None, Some(ctor)).unwrap();
    engine.install_class(id).unwrap();

    let err = engine.execute_script("new Texture()").unwrap_err();
    let message = &err.script_exception().unwrap().message;
    assert!(message.contains("texture name required"), "{}", message);

    assert_eq!(
        engine
            .execute_script("try { new Texture() } catch (e) { 'caught' }")
            .unwrap(),
        Some(Value::String("caught".into()))
    );
    assert!(engine.execute_script("new Texture('grass')").unwrap().is_some());
}

#[test]
fn test_object_arguments_are_temporary_handles() {
    let mut engine = create_test_engine();
    let (_id, seen) = install_sprite(&mut engine);
    let baseline = engine.runtime().unwrap().handle_count();

    engine
        .execute_script("void new Sprite({ frame: 2 })")
        .unwrap();

    assert!(matches!(seen.borrow()[0][0], Value::Object(_)));
    assert_eq!(engine.runtime().unwrap().handle_count(), baseline);
}

#[test]
fn test_class_without_constructor() {
    let mut engine = create_test_engine();
    let id = engine.create_class("Marker", None, None).unwrap();
    engine.install_class(id).unwrap();
    assert_eq!(
        engine
            .execute_script("typeof new Marker()")
            .unwrap(),
        Some(Value::String("object".into()))
    );
}

#[test]
fn test_unknown_parent_is_rejected() {
    let mut engine = create_test_engine();
    let foreign = {
        let mut other = create_test_engine();
        other.create_class("A", None, None).unwrap();
        other.create_class("B", None, None).unwrap()
    };
    assert!(engine.create_class("C", Some(foreign), None).is_err());
    assert!(matches!(
        engine.install_class(foreign),
        Err(BridgeError::UnknownClass(_))
    ));
}

#[test]
fn test_payload_finalized_on_cleanup() {
    let mut engine = create_test_engine();
    let count = Rc::new(Cell::new(0));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let id = engine
        .create_class("Sprite", None, Some(sprite_constructor(seen)))
        .unwrap();
    let counter = count.clone();
    engine
        .define_class_finalize(id, Rc::new(move |_: Box<dyn Any>| counter.set(counter.get() + 1)))
        .unwrap();
    engine.install_class(id).unwrap();

    engine.execute_script("var kept = new Sprite(1)").unwrap();
    assert_eq!(count.get(), 0);

    engine.cleanup();
    assert_eq!(count.get(), 1);
}

#[test]
fn test_engine_with_classes_tears_down() {
    let mut engine = create_test_engine();
    let node = engine.create_class("Node", None, None).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sprite = engine
        .create_class("Sprite", Some(node), Some(sprite_constructor(seen)))
        .unwrap();
    let marker = engine.create_class("Marker", None, None).unwrap();
    engine.install_class(sprite).unwrap();
    engine.install_class(marker).unwrap();
    engine
        .execute_script("var kept = [new Sprite(1), new Node(), new Marker()]")
        .unwrap();

    engine.cleanup();
    assert!(!engine.is_valid());
    drop(engine);

    // The process is still healthy enough to host another engine.
    let mut next = create_test_engine();
    let id = next.create_class("Marker", None, None).unwrap();
    next.install_class(id).unwrap();
    drop(next);
}

#[test]
fn test_calling_class_without_new_throws() {
    let mut engine = create_test_engine();
    install_sprite(&mut engine);
    let err = engine.execute_script("Sprite(1)").unwrap_err();
    let message = &err.script_exception().unwrap().message;
    assert!(message.starts_with("TypeError"), "{}", message);
    assert_eq!(
        engine
            .execute_script("Sprite.prototype.constructor === Sprite")
            .unwrap(),
        Some(Value::Boolean(true))
    );
}
