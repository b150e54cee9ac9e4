//! # Class Registry
//!
//! Classes, their superclass precedence and their slot templates.
//!
//! ## Precedence
//!
//! `all_superclasses` lists the class itself first, then every ancestor from
//! most to least specific with duplicates removed. For each direct
//! superclass (in declaration order) its own precedence list is appended and
//! only the last occurrence of a repeated class is kept, so shared ancestors
//! of a diamond come after every path that leads to them.
//!
//! ## Slot templates
//!
//! A class's template holds one descriptor per visible slot name, inherited
//! ones included. A subclass that redeclares a slot replaces the inherited
//! descriptor and becomes its defining class. Slot names get registry-wide
//! [`SlotId`]s, so compiled slot references stay meaningful across classes.

use bitflags::bitflags;
use indexmap::IndexSet;
use rustc_hash::FxHashMap;

use crate::handler::{Handler, HandlerRef, HandlerTable};
use crate::symbol::{Symbol, SymbolTable};
use crate::value::{Value, ValueType};

/// Index of a class in the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Registry-wide id of a slot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

/// Who may see a slot from handler bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    /// Only handlers of the defining class.
    Private,
}

/// Write access of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotAccess {
    #[default]
    ReadWrite,
    ReadOnly,
    /// Writable only while the instance is being initialized.
    InitializeOnly,
}

bitflags! {
    /// Accessor handlers generated for a slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Accessors: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

/// Declaration of a slot in a class definition.
#[derive(Debug, Clone)]
pub struct SlotSpec {
    name: String,
    multiple: bool,
    default: Option<Value>,
    visibility: Visibility,
    access: SlotAccess,
    allowed_types: Option<Vec<ValueType>>,
    accessors: Accessors,
}

impl SlotSpec {
    /// A single-field slot.
    pub fn single(name: &str) -> Self {
        Self {
            name: name.to_string(),
            multiple: false,
            default: None,
            visibility: Visibility::Public,
            access: SlotAccess::ReadWrite,
            allowed_types: None,
            accessors: Accessors::all(),
        }
    }

    /// A multifield slot.
    pub fn multiple(name: &str) -> Self {
        Self {
            multiple: true,
            ..Self::single(name)
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access = SlotAccess::ReadOnly;
        self
    }

    pub fn initialize_only(mut self) -> Self {
        self.access = SlotAccess::InitializeOnly;
        self
    }

    pub fn allowed_types(mut self, types: &[ValueType]) -> Self {
        self.allowed_types = Some(types.to_vec());
        self
    }

    pub fn accessors(mut self, accessors: Accessors) -> Self {
        self.accessors = accessors;
        self
    }
}

/// A slot as seen by one class.
#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    pub name: Symbol,
    pub id: SlotId,
    /// The class whose definition declared this descriptor.
    pub owner: ClassId,
    pub multiple: bool,
    pub default: Value,
    pub visibility: Visibility,
    pub access: SlotAccess,
    pub allowed_types: Option<Vec<ValueType>>,
    pub accessors: Accessors,
    /// `put-<slot>`, sent by message-mode placement.
    pub override_message: Symbol,
}

impl SlotDescriptor {
    /// Whether `value` satisfies the slot's type constraint. Multifield
    /// slots check each element.
    pub fn accepts(&self, value: &Value) -> bool {
        let Some(allowed) = &self.allowed_types else {
            return true;
        };
        match value {
            Value::Multifield(items) if self.multiple => {
                items.iter().all(|item| allowed.contains(&item.value_type()))
            }
            other => allowed.contains(&other.value_type()),
        }
    }
}

/// A class.
#[derive(Debug)]
pub struct Class {
    pub name: Symbol,
    pub id: ClassId,
    pub system: bool,
    pub direct_superclasses: Vec<ClassId>,
    /// Self first, then ancestors from most to least specific.
    pub all_superclasses: Vec<ClassId>,
    direct_slots: Vec<SlotDescriptor>,
    slots: Vec<SlotDescriptor>,
    slot_index: FxHashMap<SlotId, usize>,
    pub(crate) handlers: HandlerTable,
    /// Outstanding handler links into this class's table.
    pub(crate) busy: u32,
}

impl Class {
    /// The full slot template, inherited slots included.
    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    /// Slots declared by this class itself.
    pub fn direct_slots(&self) -> &[SlotDescriptor] {
        &self.direct_slots
    }

    /// Position of a slot in this class's template.
    pub fn slot_index(&self, id: SlotId) -> Option<usize> {
        self.slot_index.get(&id).copied()
    }

    pub fn slot(&self, id: SlotId) -> Option<&SlotDescriptor> {
        self.slot_index(id).map(|index| &self.slots[index])
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn busy(&self) -> u32 {
        self.busy
    }
}

/// All classes known to an engine.
#[derive(Debug)]
pub struct ClassRegistry {
    classes: Vec<Class>,
    by_name: FxHashMap<Symbol, ClassId>,
    slot_names: IndexSet<Symbol>,
    user: ClassId,
    primitives: FxHashMap<ValueType, ClassId>,
}

/// The system lattice, parents before children.
const SYSTEM_CLASSES: &[(&str, &[&str])] = &[
    ("OBJECT", &[]),
    ("PRIMITIVE", &["OBJECT"]),
    ("NUMBER", &["PRIMITIVE"]),
    ("INTEGER", &["NUMBER"]),
    ("FLOAT", &["NUMBER"]),
    ("LEXEME", &["PRIMITIVE"]),
    ("SYMBOL", &["LEXEME"]),
    ("STRING", &["LEXEME"]),
    ("MULTIFIELD", &["PRIMITIVE"]),
    ("ADDRESS", &["PRIMITIVE"]),
    ("EXTERNAL-ADDRESS", &["ADDRESS"]),
    ("INSTANCE", &["PRIMITIVE"]),
    ("INSTANCE-ADDRESS", &["ADDRESS", "INSTANCE"]),
    ("INSTANCE-NAME", &["INSTANCE"]),
    ("USER", &["OBJECT"]),
];

const PRIMITIVE_CLASSES: &[(ValueType, &str)] = &[
    (ValueType::Symbol, "SYMBOL"),
    (ValueType::String, "STRING"),
    (ValueType::Integer, "INTEGER"),
    (ValueType::Float, "FLOAT"),
    (ValueType::Multifield, "MULTIFIELD"),
    (ValueType::InstanceName, "INSTANCE-NAME"),
    (ValueType::InstanceAddress, "INSTANCE-ADDRESS"),
    (ValueType::ExternalAddress, "EXTERNAL-ADDRESS"),
];

impl ClassRegistry {
    /// Creates a registry holding the system class lattice.
    pub fn new(symbols: &mut SymbolTable) -> Self {
        let mut registry = Self {
            classes: Vec::new(),
            by_name: FxHashMap::default(),
            slot_names: IndexSet::new(),
            user: ClassId(0),
            primitives: FxHashMap::default(),
        };

        for (name, supers) in SYSTEM_CLASSES {
            let supers: Vec<ClassId> = supers
                .iter()
                .filter_map(|parent| registry.find(symbols.intern(parent)))
                .collect();
            let name = symbols.intern(name);
            registry.add_class(symbols, name, &supers, Vec::new(), true);
        }

        if let Some(user) = registry.find(symbols.intern("USER")) {
            registry.user = user;
        }
        for (ty, name) in PRIMITIVE_CLASSES {
            if let Some(class) = registry.find(symbols.intern(name)) {
                registry.primitives.insert(*ty, class);
            }
        }
        registry
    }

    /// Adds a class. Superclasses must already exist; name clashes are the
    /// caller's concern.
    pub(crate) fn add_class(
        &mut self,
        symbols: &mut SymbolTable,
        name: Symbol,
        direct_superclasses: &[ClassId],
        specs: Vec<SlotSpec>,
        system: bool,
    ) -> ClassId {
        let id = ClassId(self.classes.len() as u32);

        let mut all_superclasses: Vec<ClassId> = Vec::new();
        for parent in direct_superclasses {
            for ancestor in &self.class(*parent).all_superclasses {
                all_superclasses.retain(|seen| seen != ancestor);
                all_superclasses.push(*ancestor);
            }
        }
        all_superclasses.insert(0, id);

        let nil = symbols.known().nil;
        let direct_slots: Vec<SlotDescriptor> = specs
            .into_iter()
            .map(|spec| {
                let slot_name = symbols.intern(&spec.name);
                let (slot_index, _) = self.slot_names.insert_full(slot_name);
                let default = spec.default.unwrap_or_else(|| {
                    if spec.multiple {
                        Value::multifield([])
                    } else {
                        Value::Symbol(nil)
                    }
                });
                SlotDescriptor {
                    name: slot_name,
                    id: SlotId(slot_index as u32),
                    owner: id,
                    multiple: spec.multiple,
                    default,
                    visibility: spec.visibility,
                    access: spec.access,
                    allowed_types: spec.allowed_types,
                    accessors: spec.accessors,
                    override_message: symbols.intern(&format!("put-{}", spec.name)),
                }
            })
            .collect();

        // Least specific first, so redeclarations overwrite in place.
        let mut slots: Vec<SlotDescriptor> = Vec::new();
        let mut slot_index: FxHashMap<SlotId, usize> = FxHashMap::default();
        let inherited = all_superclasses[1..]
            .iter()
            .rev()
            .flat_map(|ancestor| self.class(*ancestor).direct_slots.iter());
        for descriptor in inherited.chain(direct_slots.iter()) {
            match slot_index.get(&descriptor.id) {
                Some(&index) => slots[index] = descriptor.clone(),
                None => {
                    slot_index.insert(descriptor.id, slots.len());
                    slots.push(descriptor.clone());
                }
            }
        }

        self.classes.push(Class {
            name,
            id,
            system,
            direct_superclasses: direct_superclasses.to_vec(),
            all_superclasses,
            direct_slots,
            slots,
            slot_index,
            handlers: HandlerTable::default(),
            busy: 0,
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn find(&self, name: Symbol) -> Option<ClassId> {
        self.by_name.get(&name).copied()
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub(crate) fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.index()]
    }

    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    /// The id of a slot name, if any class ever declared it.
    pub fn slot_id(&self, name: Symbol) -> Option<SlotId> {
        self.slot_names.get_index_of(&name).map(|index| SlotId(index as u32))
    }

    /// The default superclass of user-defined classes.
    pub fn user(&self) -> ClassId {
        self.user
    }

    /// The system class a primitive value dispatches through.
    pub fn primitive_class(&self, ty: ValueType) -> ClassId {
        self.primitives.get(&ty).copied().unwrap_or(self.user)
    }

    pub fn is_subclass(&self, class: ClassId, of: ClassId) -> bool {
        self.class(class).all_superclasses.contains(&of)
    }

    /// The handler `link` points at, unless it has been deleted.
    pub fn handler(&self, link: HandlerRef) -> Option<&Handler> {
        self.classes.get(link.class.index())?.handlers.get(link.index)
    }

    pub(crate) fn handler_mut(&mut self, link: HandlerRef) -> Option<&mut Handler> {
        self.classes.get_mut(link.class.index())?.handlers.get_mut(link.index)
    }
}
