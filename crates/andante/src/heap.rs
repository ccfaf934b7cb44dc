//! The object arena and the property store semantics.
//!
//! Every object lives in a slab keyed by [`ObjId`]; `parent`, scope links and
//! property values are indices or inline primitives, never owning pointers,
//! which dissolves the cyclic constructor/prototype/scope graphs at the type
//! level. There is no per-object destruction: a host reclaims everything by
//! dropping the interpreter.
//!
//! An object's `parent` is its *constructor*; the prototype is reached by one
//! further indirection through the constructor's `prototype` property.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::FunctionNode,
    error::{Exception, RunError, RunResult},
    host::AsyncHandle,
    interp::{Interpreter, Realm},
    resource::ResourceTracker,
    value::{Value, array_index, str_to_number, to_uint32, utf16_char_at, utf16_len},
};

/// Index of an object in the interpreter's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(u32);

impl ObjId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Placeholder id used while the realm is being bootstrapped.
    pub(crate) const PLACEHOLDER: Self = Self(0);
}

/// Signature of a synchronous host-native function.
pub(crate) type NativeFn = Rc<dyn Fn(&mut Interpreter, Value, &[Value]) -> Result<Value, Exception>>;

/// Signature of an asynchronous host-native function. The handle resolves or
/// rejects the call later; execution stays paused until then.
pub(crate) type AsyncFn = Rc<dyn Fn(&mut Interpreter, Value, &[Value], AsyncHandle) -> Result<(), Exception>>;

/// Execution body of a function object.
pub(crate) enum FnBody {
    /// A user function: AST node plus captured defining scope.
    Ast { node: Rc<FunctionNode>, scope: ObjId },
    Native(NativeFn),
    Async(AsyncFn),
    /// Result of `Function.prototype.bind`.
    Bound {
        target: ObjId,
        this_value: Value,
        bound_args: Vec<Value>,
    },
    /// The `eval` built-in; dispatched specially by the call machinery.
    Eval,
}

impl std::fmt::Debug for FnBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ast { node, scope } => f.debug_struct("Ast").field("node", node).field("scope", scope).finish(),
            Self::Native(_) => f.write_str("Native"),
            Self::Async(_) => f.write_str("Async"),
            Self::Bound { target, .. } => f.debug_struct("Bound").field("target", target).finish(),
            Self::Eval => f.write_str("Eval"),
        }
    }
}

/// Compiled regular expression payload. The compiled matcher is shared so
/// string methods can use it without holding a heap borrow.
pub(crate) struct RegexpData {
    pub source: Rc<str>,
    pub flags: Rc<str>,
    pub matcher: Rc<regress::Regex>,
}

impl RegexpData {
    pub(crate) fn is_global(&self) -> bool {
        self.flags.contains('g')
    }

    pub(crate) fn is_ignore_case(&self) -> bool {
        self.flags.contains('i')
    }

    pub(crate) fn is_multiline(&self) -> bool {
        self.flags.contains('m')
    }
}

impl std::fmt::Debug for RegexpData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegexpData(/{}/{})", self.source, self.flags)
    }
}

/// Scope payload: a parent link, the strict flag, and for `with` scopes the
/// object whose properties act as bindings.
#[derive(Debug)]
pub(crate) struct ScopeData {
    pub parent: Option<ObjId>,
    pub strict: bool,
    pub with_object: Option<ObjId>,
}

/// Variant payload of a heap object.
#[derive(Debug)]
pub(crate) enum ObjKind {
    Plain,
    Array { length: u32 },
    Function(Box<FnData>),
    BoxedNumber(f64),
    BoxedString(Rc<str>),
    BoxedBoolean(bool),
    Date(f64),
    Regexp(Box<RegexpData>),
    Scope(Box<ScopeData>),
}

#[derive(Debug)]
pub(crate) struct FnData {
    pub body: FnBody,
}

/// One own property: a value or accessor pair, plus the three ES5 attributes.
#[derive(Debug, Clone)]
pub(crate) struct Property {
    pub value: Value,
    pub getter: Option<ObjId>,
    pub setter: Option<ObjId>,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Property {
    /// A property created by ordinary assignment: all attributes set.
    pub(crate) fn data(value: Value) -> Self {
        Self {
            value,
            getter: None,
            setter: None,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// The attribute set used for built-in methods and constructors:
    /// writable and configurable but not enumerable.
    pub(crate) fn builtin(value: Value) -> Self {
        Self {
            enumerable: false,
            ..Self::data(value)
        }
    }

    /// A fully locked property (none of the attributes set).
    pub(crate) fn frozen(value: Value) -> Self {
        Self {
            value,
            getter: None,
            setter: None,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    pub(crate) fn is_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }
}

/// Descriptor accepted by `Object.defineProperty` and the host `set_property`
/// with descriptor. Absent fields default to off, per the source dialect.
#[derive(Debug, Default, Clone)]
pub(crate) struct Descriptor {
    pub value: Option<Value>,
    pub getter: Option<ObjId>,
    pub setter: Option<ObjId>,
    pub writable: Option<bool>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

/// Result of a prototype-chain property read.
#[derive(Debug)]
pub(crate) enum PropLookup {
    NotFound,
    Data(Value),
    /// An accessor property; `getter` is `None` for a setter-only slot.
    Accessor { getter: Option<ObjId> },
}

/// Result of a property write.
#[derive(Debug)]
pub(crate) enum SetOutcome {
    /// Stored (or silently ignored, e.g. non-writable in sloppy mode).
    Done,
    /// A setter on the chain must be invoked with the written value.
    Setter(ObjId),
}

#[derive(Debug)]
pub(crate) struct JsObject {
    pub kind: ObjKind,
    /// The constructor whose `prototype` property heads this object's chain.
    pub parent: Option<ObjId>,
    pub props: IndexMap<Rc<str>, Property, ahash::RandomState>,
    pub extensible: bool,
}

impl JsObject {
    pub(crate) fn new(kind: ObjKind, parent: Option<ObjId>) -> Self {
        Self {
            kind,
            parent,
            props: IndexMap::default(),
            extensible: true,
        }
    }

    pub(crate) fn is_function(&self) -> bool {
        matches!(self.kind, ObjKind::Function(_))
    }

    pub(crate) fn fn_data(&self) -> Option<&FnData> {
        match &self.kind {
            ObjKind::Function(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn scope_data(&self) -> Option<&ScopeData> {
        match &self.kind {
            ObjKind::Scope(data) => Some(data),
            _ => None,
        }
    }

    /// Array length, when this object is an array.
    pub(crate) fn array_length(&self) -> Option<u32> {
        match self.kind {
            ObjKind::Array { length } => Some(length),
            _ => None,
        }
    }
}

/// The object arena. Owns the resource tracker so every allocation is
/// accounted for.
pub(crate) struct Heap {
    slots: Vec<JsObject>,
    tracker: Box<dyn ResourceTracker>,
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap").field("live_objects", &self.slots.len()).finish()
    }
}

impl Heap {
    pub(crate) fn new(tracker: Box<dyn ResourceTracker>) -> Self {
        Self {
            slots: Vec::with_capacity(64),
            tracker,
        }
    }

    pub(crate) fn alloc(&mut self, obj: JsObject) -> RunResult<ObjId> {
        self.tracker.check_alloc(self.slots.len() + 1)?;
        let id = ObjId(u32::try_from(self.slots.len()).expect("heap exceeds u32 indices"));
        self.slots.push(obj);
        Ok(id)
    }

    pub(crate) fn get(&self, id: ObjId) -> &JsObject {
        &self.slots[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ObjId) -> &mut JsObject {
        &mut self.slots[id.index()]
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut dyn ResourceTracker {
        &mut *self.tracker
    }

    /// The prototype of `id`: its constructor's `prototype` property.
    pub(crate) fn proto_of(&self, id: ObjId) -> Option<ObjId> {
        let ctor = self.get(id).parent?;
        self.constructor_prototype(ctor)
    }

    /// A constructor's `prototype` own property, as an object.
    pub(crate) fn constructor_prototype(&self, ctor: ObjId) -> Option<ObjId> {
        self.get(ctor).props.get("prototype")?.value.as_object()
    }

    /// Head of the prototype chain for any base value: for primitives this is
    /// the prototype of their governing constructor.
    fn chain_head(&self, realm: &Realm, base: &Value) -> Option<ObjId> {
        match base {
            Value::Number(_) => self.constructor_prototype(realm.number),
            Value::String(_) => self.constructor_prototype(realm.string),
            Value::Boolean(_) => self.constructor_prototype(realm.boolean),
            Value::Object(id) => Some(*id),
            Value::Undefined | Value::Null => None,
        }
    }

    /// Whether a string payload has the magic own property `name`.
    pub(crate) fn string_own_exists(s: &str, name: &str) -> bool {
        Self::string_own(s, name).is_some()
    }

    /// The magic own properties of string payloads: `length` and indexing.
    fn string_own(s: &str, name: &str) -> Option<Value> {
        if name == "length" {
            return Some(Value::Number(utf16_len(s) as f64));
        }
        let index = array_index(name)?;
        utf16_char_at(s, index as usize).map(Value::String)
    }

    /// Own-property read covering the payload magic (array length, boxed and
    /// primitive strings).
    fn own_lookup(&self, id: ObjId, name: &str) -> Option<PropLookup> {
        let obj = self.get(id);
        match &obj.kind {
            ObjKind::Array { length } if name == "length" => {
                return Some(PropLookup::Data(Value::Number(f64::from(*length))));
            }
            ObjKind::BoxedString(s) => {
                if let Some(value) = Self::string_own(s, name) {
                    return Some(PropLookup::Data(value));
                }
            }
            _ => {}
        }
        let prop = obj.props.get(name)?;
        if prop.is_accessor() {
            Some(PropLookup::Accessor { getter: prop.getter })
        } else {
            Some(PropLookup::Data(prop.value.clone()))
        }
    }

    /// Prototype-chain property read. Getter dispatch is left to the caller.
    ///
    /// Reading from `undefined`/`null` is a `TypeError`.
    pub(crate) fn lookup(&self, realm: &Realm, base: &Value, name: &str) -> RunResult<PropLookup> {
        if matches!(base, Value::Undefined | Value::Null) {
            return Err(RunError::type_error(format!(
                "Cannot read property '{name}' of {}",
                if matches!(base, Value::Null) { "null" } else { "undefined" }
            )));
        }
        if let Value::String(s) = base
            && let Some(value) = Self::string_own(s, name)
        {
            return Ok(PropLookup::Data(value));
        }
        let mut current = self.chain_head(realm, base);
        let mut visited = Vec::new();
        while let Some(id) = current {
            if visited.contains(&id) {
                break;
            }
            visited.push(id);
            if let Some(found) = self.own_lookup(id, name) {
                return Ok(found);
            }
            current = self.proto_of(id);
        }
        Ok(PropLookup::NotFound)
    }

    /// Whether `name` is reachable anywhere on the chain (the `in` operator).
    pub(crate) fn has_property(&self, realm: &Realm, base: &Value, name: &str) -> bool {
        if let Value::String(s) = base
            && Self::string_own(s, name).is_some()
        {
            return true;
        }
        let mut current = self.chain_head(realm, base);
        let mut visited = Vec::new();
        while let Some(id) = current {
            if visited.contains(&id) {
                break;
            }
            visited.push(id);
            if self.own_lookup(id, name).is_some() {
                return true;
            }
            current = self.proto_of(id);
        }
        false
    }

    /// Finds a setter (or getter-only block) for `name` along the chain.
    fn find_accessor(&self, id: ObjId, name: &str) -> Option<(Option<ObjId>, Option<ObjId>)> {
        let mut current = Some(id);
        let mut visited = Vec::new();
        while let Some(obj_id) = current {
            if visited.contains(&obj_id) {
                break;
            }
            visited.push(obj_id);
            let obj = self.get(obj_id);
            if let Some(prop) = obj.props.get(name) {
                if prop.is_accessor() {
                    return Some((prop.getter, prop.setter));
                }
                // A data property shadows any accessor further up.
                return None;
            }
            current = self.proto_of(obj_id);
        }
        None
    }

    /// Ordinary assignment (`obj.name = value`). Respects setters on the
    /// prototype chain, array length magic and extensibility; assignment to
    /// string indices is silently ignored.
    pub(crate) fn set_prop(
        &mut self,
        base: &Value,
        name: &str,
        value: Value,
        strict: bool,
    ) -> RunResult<SetOutcome> {
        let id = match base {
            Value::Undefined | Value::Null => {
                return Err(RunError::type_error(format!(
                    "Cannot set property '{name}' of {}",
                    if matches!(base, Value::Null) { "null" } else { "undefined" }
                )));
            }
            // Assignments to primitive properties (including string indices)
            // are dropped on the floor.
            Value::Number(_) | Value::String(_) | Value::Boolean(_) => return Ok(SetOutcome::Done),
            Value::Object(id) => *id,
        };

        if let Some((getter, setter)) = self.find_accessor(id, name) {
            if let Some(setter) = setter {
                return Ok(SetOutcome::Setter(setter));
            }
            debug_assert!(getter.is_some());
            if strict {
                return Err(RunError::type_error(format!(
                    "Cannot set property '{name}' which has only a getter"
                )));
            }
            return Ok(SetOutcome::Done);
        }

        if self.get(id).array_length().is_some() && name == "length" {
            return self.set_array_length(id, &value).map(|()| SetOutcome::Done);
        }

        if let Some(existing) = self.get(id).props.get(name) {
            if !existing.writable {
                if strict {
                    return Err(RunError::type_error(format!(
                        "Cannot assign to read only property '{name}'"
                    )));
                }
                return Ok(SetOutcome::Done);
            }
        } else if !self.get(id).extensible {
            if strict {
                return Err(RunError::type_error(format!(
                    "Cannot add property '{name}', object is not extensible"
                )));
            }
            return Ok(SetOutcome::Done);
        }

        self.insert_data_prop(id, name, value);
        Ok(SetOutcome::Done)
    }

    /// Raw data-property insert, maintaining array length. Used by assignment
    /// (after the checks above), literals and the host bridge.
    pub(crate) fn insert_data_prop(&mut self, id: ObjId, name: &str, value: Value) {
        let obj = self.get_mut(id);
        match obj.props.get_mut(name) {
            Some(prop) => {
                prop.value = value;
                prop.getter = None;
                prop.setter = None;
            }
            None => {
                obj.props.insert(Rc::from(name), Property::data(value));
            }
        }
        self.grow_array_length(id, name);
    }

    fn grow_array_length(&mut self, id: ObjId, name: &str) {
        if let Some(index) = array_index(name)
            && let ObjKind::Array { length } = &mut self.get_mut(id).kind
            && index >= *length
        {
            *length = index + 1;
        }
    }

    /// `array.length = n`: shrinking deletes every superseded index.
    fn set_array_length(&mut self, id: ObjId, value: &Value) -> RunResult<()> {
        let n = match value {
            Value::Number(n) => *n,
            Value::String(s) => str_to_number(s),
            other => other.to_number(self),
        };
        let new_len = to_uint32(n);
        if f64::from(new_len) != n {
            return Err(RunError::range_error("Invalid array length"));
        }
        let obj = self.get_mut(id);
        obj.props
            .retain(|key, _| array_index(key).is_none_or(|index| index < new_len));
        if let ObjKind::Array { length } = &mut obj.kind {
            *length = new_len;
        }
        Ok(())
    }

    /// `Object.defineProperty` semantics: absent attributes default to off,
    /// and any redefinition of a non-configurable property throws.
    pub(crate) fn define_prop(&mut self, id: ObjId, name: &str, desc: &Descriptor) -> RunResult<()> {
        let obj = self.get(id);
        let existing = obj.props.get(name);
        if let Some(prop) = existing {
            if !prop.configurable {
                return Err(RunError::type_error(format!("Cannot redefine property: {name}")));
            }
        } else if !obj.extensible {
            return Err(RunError::type_error(format!(
                "Cannot define property '{name}', object is not extensible"
            )));
        }

        let prop = if desc.getter.is_some() || desc.setter.is_some() {
            // Accessor definition: the data slot is parked at undefined and
            // the writable attribute is cleared.
            Property {
                value: Value::Undefined,
                getter: desc.getter,
                setter: desc.setter,
                writable: true,
                enumerable: desc.enumerable.unwrap_or(false),
                configurable: desc.configurable.unwrap_or(false),
            }
        } else {
            let value = match (&desc.value, existing) {
                (Some(value), _) => value.clone(),
                (None, Some(prop)) => prop.value.clone(),
                (None, None) => Value::Undefined,
            };
            Property {
                value,
                getter: None,
                setter: None,
                writable: desc.writable.unwrap_or(false),
                enumerable: desc.enumerable.unwrap_or(false),
                configurable: desc.configurable.unwrap_or(false),
            }
        };
        self.get_mut(id).props.insert(Rc::from(name), prop);
        self.grow_array_length(id, name);
        Ok(())
    }

    /// The `delete` operator. Returns whether the property is gone.
    pub(crate) fn delete_prop(&mut self, base: &Value, name: &str, strict: bool) -> RunResult<bool> {
        let Value::Object(id) = base else {
            return Ok(true);
        };
        if self.get(*id).array_length().is_some() && name == "length" {
            return Ok(false);
        }
        match self.get(*id).props.get(name) {
            None => Ok(true),
            Some(prop) if prop.configurable => {
                self.get_mut(*id).props.shift_remove(name);
                Ok(true)
            }
            Some(_) => {
                if strict {
                    Err(RunError::type_error(format!("Cannot delete property '{name}'")))
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Own enumerable property names, in insertion order. Array `length` and
    /// string magic do not participate in enumeration.
    pub(crate) fn own_enumerable_keys(&self, id: ObjId) -> Vec<Rc<str>> {
        self.get(id)
            .props
            .iter()
            .filter(|(_, prop)| prop.enumerable)
            .map(|(key, _)| Rc::clone(key))
            .collect()
    }

    /// Own property names regardless of enumerability
    /// (`Object.getOwnPropertyNames`).
    pub(crate) fn own_keys(&self, id: ObjId) -> Vec<Rc<str>> {
        let mut keys: Vec<Rc<str>> = self.get(id).props.keys().map(Rc::clone).collect();
        if self.get(id).array_length().is_some() {
            keys.push(Rc::from("length"));
        }
        keys
    }

    /// Appends `value` at the end of an array.
    pub(crate) fn array_push(&mut self, id: ObjId, value: Value) {
        let length = self.get(id).array_length().unwrap_or(0);
        self.insert_data_prop(id, &length.to_string(), value);
    }

    /// Reads an element by index, own data properties only.
    pub(crate) fn array_get(&self, id: ObjId, index: u32) -> Value {
        self.get(id)
            .props
            .get(index.to_string().as_str())
            .map_or(Value::Undefined, |prop| prop.value.clone())
    }

    /// `a instanceof ctor`: walks `a`'s prototype chain looking for the
    /// constructor's `prototype` object.
    pub(crate) fn instance_of(&self, value: &Value, ctor: ObjId) -> RunResult<bool> {
        let Some(target) = self.constructor_prototype(ctor) else {
            return Ok(false);
        };
        let &Value::Object(mut current) = value else {
            return Ok(false);
        };
        let mut visited = Vec::new();
        loop {
            if visited.contains(&current) {
                return Ok(false);
            }
            visited.push(current);
            match self.proto_of(current) {
                Some(proto) if proto == target => return Ok(true),
                Some(proto) => current = proto,
                None => return Ok(false),
            }
        }
    }
}
