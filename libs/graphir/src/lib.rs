//! The canonical semantic hypergraph for ASDL designs.
//!
//! A [`Program`] owns every entity (modules, devices, nets, instances,
//! endpoints) in arenas keyed by opaque, never-reused IDs. Nets are
//! hyperedges: each net owns the endpoints attached to it, region-nested
//! in attachment order. Region order is canonical; edits append.
//!
//! Names may still contain pattern syntax at this level. Atomization
//! replaces patterned entities with their literal expansions; the result
//! is again a valid `Program`. Pattern provenance is metadata only: it
//! never participates in identity, equality, or binding.
//!
//! All external references are by ID. Derived indices (endpoint to net,
//! instance to endpoints) are rebuildable caches, never canonical state.

#![warn(missing_docs)]

pub mod validation;
#[cfg(test)]
pub(crate) mod tests;

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use diagnostics::{DiagnosticSet, FileId};
use indexmap::IndexMap;
use pattern::{PatternEnv, PatternPart};
use serde::{Deserialize, Serialize};
use tracing::{span, Level};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        ///
        /// IDs are opaque and never reused within a program. An ID created
        /// in the context of one program must not be used in another.
        #[derive(
            Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd,
            Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// An opaque module identifier.
    ModuleId, "module"
);
entity_id!(
    /// An opaque device identifier.
    DeviceId, "device"
);
entity_id!(
    /// An opaque net identifier.
    NetId, "net"
);
entity_id!(
    /// An opaque instance identifier.
    InstanceId, "inst"
);
entity_id!(
    /// An opaque endpoint identifier.
    EndpointId, "endpoint"
);
entity_id!(
    /// An opaque pattern-expression identifier.
    ExprId, "expr"
);

impl From<ExprId> for u64 {
    fn from(value: ExprId) -> Self {
        value.0
    }
}

/// A reference to a symbol by file identity and name.
///
/// Module identity is `(file_id, name)`; the same logical name may exist
/// in many files.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SymbolRef {
    /// The defining file.
    pub file: FileId,
    /// The symbol name within that file.
    pub name: ArcStr,
}

impl Display for SymbolRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.name)
    }
}

/// The resolved target of an instance.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ChildRef {
    /// A hierarchical child module.
    Module(ModuleId),
    /// A leaf device.
    Device(DeviceId),
}

impl ChildRef {
    /// Returns the module ID if this is a module reference.
    pub fn module(&self) -> Option<ModuleId> {
        match self {
            Self::Module(id) => Some(*id),
            Self::Device(_) => None,
        }
    }

    /// Returns the device ID if this is a device reference.
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            Self::Device(id) => Some(*id),
            Self::Module(_) => None,
        }
    }
}

/// Provenance linking an entity (or atom) back to its authoring pattern.
///
/// Provenance is presentation metadata. It is deliberately excluded from
/// entity identity and binding.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PatternOrigin {
    /// The interned source expression.
    pub expr: ExprId,
    /// Index of the producing splice segment.
    pub segment: usize,
    /// Concatenation of the producing segment's literal pieces.
    pub base_name: ArcStr,
    /// The alternatives chosen by each group; empty before atomization.
    pub parts: Vec<PatternPart>,
}

/// A module-local table interning pattern expression strings.
///
/// Many atoms share one entry; provenance records refer to entries by
/// stable [`ExprId`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PatternExprTable {
    exprs: IndexMap<ExprId, ArcStr>,
    #[serde(skip)]
    by_text: HashMap<ArcStr, ExprId>,
    next_id: u64,
}

impl PatternExprTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns the given expression text, returning its stable ID.
    pub fn intern(&mut self, text: impl Into<ArcStr>) -> ExprId {
        let text = text.into();
        if let Some(id) = self.by_text.get(&text) {
            return *id;
        }
        self.next_id += 1;
        let id = ExprId(self.next_id);
        self.exprs.insert(id, text.clone());
        self.by_text.insert(text, id);
        id
    }

    /// The expression text for the given ID.
    pub fn get(&self, id: ExprId) -> Option<&ArcStr> {
        self.exprs.get(&id)
    }

    /// Iterates over `(id, text)` pairs in interning order.
    pub fn iter(&self) -> impl Iterator<Item = (ExprId, &ArcStr)> {
        self.exprs.iter().map(|(id, text)| (*id, text))
    }

    /// The number of interned expressions.
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// Returns `true` if no expressions are interned.
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

/// An attachment point `(instance, port)` on a net.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    id: EndpointId,
    inst: InstanceId,
    port_path: ArcStr,
    /// Provenance, if the producing token contained pattern syntax.
    pub pattern_origin: Option<PatternOrigin>,
}

impl Endpoint {
    /// The endpoint's ID.
    #[inline]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// The instance this endpoint attaches to.
    #[inline]
    pub fn inst(&self) -> InstanceId {
        self.inst
    }

    /// The port path on the instance. May contain pattern syntax before
    /// atomization.
    #[inline]
    pub fn port_path(&self) -> &ArcStr {
        &self.port_path
    }
}

/// A net: a hyperedge owning its endpoints in attachment order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Net {
    id: NetId,
    name: ArcStr,
    is_port: bool,
    endpoints: IndexMap<EndpointId, Endpoint>,
    attrs: IndexMap<ArcStr, ArcStr>,
    /// Provenance, if the net name contained pattern syntax.
    pub pattern_origin: Option<PatternOrigin>,
}

impl Net {
    /// The net's ID.
    #[inline]
    pub fn id(&self) -> NetId {
        self.id
    }

    /// The net's name, without the `$` port marker.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Returns `true` if the net was declared with a `$` prefix.
    #[inline]
    pub fn is_port(&self) -> bool {
        self.is_port
    }

    /// Iterates over the net's endpoints in attachment order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    /// The endpoint with the given ID, if attached to this net.
    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(&id)
    }

    /// The number of endpoints attached to this net.
    pub fn num_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    /// The net's attributes, in insertion order.
    #[inline]
    pub fn attrs(&self) -> &IndexMap<ArcStr, ArcStr> {
        &self.attrs
    }
}

/// An instance of a module or device placed inside a module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    id: InstanceId,
    name: ArcStr,
    child: ChildRef,
    ref_raw: ArcStr,
    props: IndexMap<ArcStr, ArcStr>,
    /// Provenance, if the instance name contained pattern syntax.
    pub pattern_origin: Option<PatternOrigin>,
}

impl Instance {
    /// The instance's ID.
    #[inline]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The instance's name. May contain pattern syntax before
    /// atomization.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The resolved child reference.
    #[inline]
    pub fn child(&self) -> ChildRef {
        self.child
    }

    /// The reference text as authored (`symbol` or `ns.symbol`).
    #[inline]
    pub fn ref_raw(&self) -> &ArcStr {
        &self.ref_raw
    }

    /// The instance's parameter values, in authoring order.
    #[inline]
    pub fn props(&self) -> &IndexMap<ArcStr, ArcStr> {
        &self.props
    }
}

/// A backend entry of a device declaration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceBackend {
    /// The device line template.
    pub template: ArcStr,
    /// Backend-level parameter defaults.
    pub parameters: IndexMap<ArcStr, ArcStr>,
    /// Backend-level variables. Available to templates, never merged into
    /// parameters.
    pub variables: IndexMap<ArcStr, ArcStr>,
    /// Freeform placeholder values.
    pub props: IndexMap<ArcStr, ArcStr>,
}

/// A leaf device symbol.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    id: DeviceId,
    name: ArcStr,
    file: FileId,
    /// Declared port order. May be empty for portless devices.
    pub ports: Vec<ArcStr>,
    /// Device-level parameter defaults, in declaration order.
    pub parameters: IndexMap<ArcStr, ArcStr>,
    /// Device-level variables.
    pub variables: IndexMap<ArcStr, ArcStr>,
    /// Per-backend entries. Never empty.
    pub backends: IndexMap<ArcStr, DeviceBackend>,
}

impl Device {
    /// The device's ID.
    #[inline]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// The device's name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The defining file.
    #[inline]
    pub fn file(&self) -> &FileId {
        &self.file
    }
}

/// A hierarchical design unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Module {
    id: ModuleId,
    name: ArcStr,
    file: FileId,
    /// Port nets in derived port order.
    pub(crate) ports: Vec<NetId>,
    pub(crate) nets: IndexMap<NetId, Net>,
    pub(crate) instances: IndexMap<InstanceId, Instance>,
    /// Module-local named patterns.
    pub patterns: PatternEnv,
    /// Module parameters.
    pub parameters: IndexMap<ArcStr, ArcStr>,
    /// Module variables, the `{var}` substitution environment.
    pub variables: IndexMap<ArcStr, ArcStr>,
    /// Interned pattern expressions for provenance records.
    pub exprs: PatternExprTable,
}

impl Module {
    /// The module's ID.
    #[inline]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// The module's name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The defining file.
    #[inline]
    pub fn file(&self) -> &FileId {
        &self.file
    }

    /// The module's port nets in derived port order.
    #[inline]
    pub fn ports(&self) -> &[NetId] {
        &self.ports
    }

    /// Iterates over `(id, net)` pairs in region order.
    pub fn nets(&self) -> impl Iterator<Item = (NetId, &Net)> {
        self.nets.iter().map(|(id, net)| (*id, net))
    }

    /// The net with the given ID.
    pub fn net(&self, id: NetId) -> Option<&Net> {
        self.nets.get(&id)
    }

    /// The net with the given name.
    pub fn net_named(&self, name: &str) -> Option<&Net> {
        self.nets.values().find(|n| n.name == name)
    }

    /// Iterates over `(id, instance)` pairs in region order.
    pub fn instances(&self) -> impl Iterator<Item = (InstanceId, &Instance)> {
        self.instances.iter().map(|(id, inst)| (*id, inst))
    }

    /// The instance with the given ID.
    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    /// The instance with the given name.
    pub fn instance_named(&self, name: &str) -> Option<&Instance> {
        self.instances.values().find(|i| i.name == name)
    }
}

/// Derived lookup indices over one module.
///
/// Rebuildable from region state; never canonical.
#[derive(Clone, Debug, Default)]
pub struct Indices {
    /// Net owning each endpoint.
    pub endpoint_to_net: HashMap<EndpointId, NetId>,
    /// Endpoints attached to each instance.
    pub inst_to_endpoints: HashMap<InstanceId, Vec<EndpointId>>,
    /// Endpoints of each net, in region order.
    pub net_to_endpoints: HashMap<NetId, Vec<EndpointId>>,
}

impl Indices {
    /// Builds the indices for the given module.
    pub fn build(module: &Module) -> Self {
        let mut indices = Self::default();
        for (net_id, net) in module.nets() {
            let eps: Vec<EndpointId> = net.endpoints().map(|e| e.id()).collect();
            for endpoint in net.endpoints() {
                indices.endpoint_to_net.insert(endpoint.id(), net_id);
                indices
                    .inst_to_endpoints
                    .entry(endpoint.inst())
                    .or_default()
                    .push(endpoint.id());
            }
            indices.net_to_endpoints.insert(net_id, eps);
        }
        indices
    }
}

/// How modules are ordered for emission.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum EmitOrder {
    /// Children precede parents; the entry module is last. Only modules
    /// reachable from the entry appear.
    #[default]
    Design,
    /// All modules: entry file first, then files in resolution order,
    /// preserving per-file module order.
    Library,
}

/// An ordered program of module graphs and device symbols.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Program {
    module_id: u64,
    device_id: u64,
    net_id: u64,
    instance_id: u64,
    endpoint_id: u64,

    modules: IndexMap<ModuleId, Module>,
    devices: IndexMap<DeviceId, Device>,

    #[serde(skip)]
    module_index: HashMap<SymbolRef, ModuleId>,
    #[serde(skip)]
    device_index: HashMap<SymbolRef, DeviceId>,

    /// Files contributing to the program, in discovery order (entry
    /// first).
    pub files: Vec<FileId>,
    /// The entry module, if one resolved.
    pub entry: Option<ModuleId>,
    /// The `top` name declared by the entry file, resolved or not.
    pub top_name: Option<ArcStr>,
}

impl Program {
    /// Creates a new, empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a contributing file in discovery order.
    pub fn add_file(&mut self, file: FileId) {
        if !self.files.contains(&file) {
            self.files.push(file);
        }
    }

    /// Creates an empty module shell.
    pub fn create_module(&mut self, name: impl Into<ArcStr>, file: FileId) -> ModuleId {
        self.module_id += 1;
        let id = ModuleId(self.module_id);
        let name = name.into();
        self.module_index.insert(
            SymbolRef {
                file: file.clone(),
                name: name.clone(),
            },
            id,
        );
        self.modules.insert(
            id,
            Module {
                id,
                name,
                file,
                ports: Vec::new(),
                nets: IndexMap::new(),
                instances: IndexMap::new(),
                patterns: PatternEnv::new(),
                parameters: IndexMap::new(),
                variables: IndexMap::new(),
                exprs: PatternExprTable::new(),
            },
        );
        id
    }

    /// Creates a device symbol.
    pub fn create_device(
        &mut self,
        name: impl Into<ArcStr>,
        file: FileId,
        ports: Vec<ArcStr>,
        parameters: IndexMap<ArcStr, ArcStr>,
        variables: IndexMap<ArcStr, ArcStr>,
        backends: IndexMap<ArcStr, DeviceBackend>,
    ) -> DeviceId {
        self.device_id += 1;
        let id = DeviceId(self.device_id);
        let name = name.into();
        self.device_index.insert(
            SymbolRef {
                file: file.clone(),
                name: name.clone(),
            },
            id,
        );
        self.devices.insert(
            id,
            Device {
                id,
                name,
                file,
                ports,
                parameters,
                variables,
                backends,
            },
        );
        id
    }

    /// The module with the given ID.
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    /// A mutable reference to the module with the given ID.
    ///
    /// Prefer [`Program::edit`] for semantic edits: direct mutation
    /// bypasses transactional validation.
    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(&id)
    }

    /// The device with the given ID.
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    /// Looks up a module by `(file, name)` identity.
    pub fn module_by_ref(&self, file: &FileId, name: &str) -> Option<ModuleId> {
        self.module_index.get(&SymbolRef {
            file: file.clone(),
            name: ArcStr::from(name),
        }).copied()
    }

    /// Looks up a device by `(file, name)` identity.
    pub fn device_by_ref(&self, file: &FileId, name: &str) -> Option<DeviceId> {
        self.device_index.get(&SymbolRef {
            file: file.clone(),
            name: ArcStr::from(name),
        }).copied()
    }

    /// The symbol reference of an instance's child.
    pub fn symbol_ref(&self, child: ChildRef) -> Option<SymbolRef> {
        match child {
            ChildRef::Module(id) => self.module(id).map(|m| SymbolRef {
                file: m.file.clone(),
                name: m.name.clone(),
            }),
            ChildRef::Device(id) => self.device(id).map(|d| SymbolRef {
                file: d.file.clone(),
                name: d.name.clone(),
            }),
        }
    }

    /// Iterates over `(id, module)` pairs in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().map(|(id, m)| (*id, m))
    }

    /// Iterates over `(id, device)` pairs in insertion order.
    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &Device)> {
        self.devices.iter().map(|(id, d)| (*id, d))
    }

    /// The number of modules in the program.
    pub fn num_modules(&self) -> usize {
        self.modules.len()
    }

    /// Appends a net to the given module's region.
    pub fn add_net(
        &mut self,
        module: ModuleId,
        name: impl Into<ArcStr>,
        is_port: bool,
        pattern_origin: Option<PatternOrigin>,
    ) -> NetId {
        self.net_id += 1;
        let id = NetId(self.net_id);
        let module = self.modules.get_mut(&module).expect("no such module");
        module.nets.insert(
            id,
            Net {
                id,
                name: name.into(),
                is_port,
                endpoints: IndexMap::new(),
                attrs: IndexMap::new(),
                pattern_origin,
            },
        );
        id
    }

    /// Appends an instance to the given module's region.
    pub fn add_instance(
        &mut self,
        module: ModuleId,
        name: impl Into<ArcStr>,
        child: ChildRef,
        ref_raw: impl Into<ArcStr>,
        props: IndexMap<ArcStr, ArcStr>,
        pattern_origin: Option<PatternOrigin>,
    ) -> InstanceId {
        self.instance_id += 1;
        let id = InstanceId(self.instance_id);
        let module = self.modules.get_mut(&module).expect("no such module");
        module.instances.insert(
            id,
            Instance {
                id,
                name: name.into(),
                child,
                ref_raw: ref_raw.into(),
                props,
                pattern_origin,
            },
        );
        id
    }

    /// Attaches an endpoint to the given net.
    pub fn attach_endpoint(
        &mut self,
        module: ModuleId,
        net: NetId,
        inst: InstanceId,
        port_path: impl Into<ArcStr>,
        pattern_origin: Option<PatternOrigin>,
    ) -> EndpointId {
        self.endpoint_id += 1;
        let id = EndpointId(self.endpoint_id);
        let module = self.modules.get_mut(&module).expect("no such module");
        let net = module.nets.get_mut(&net).expect("no such net");
        net.endpoints.insert(
            id,
            Endpoint {
                id,
                inst,
                port_path: port_path.into(),
                pattern_origin,
            },
        );
        id
    }

    /// Appends a net to the module's derived port order.
    pub fn add_port(&mut self, module: ModuleId, net: NetId) {
        let module = self.modules.get_mut(&module).expect("no such module");
        if !module.ports.contains(&net) {
            module.ports.push(net);
        }
    }

    /// Opens a transaction over the given module.
    ///
    /// All edits apply to a copy-on-write snapshot; committing validates
    /// the result and swaps it in. Dropping the transaction without
    /// committing leaves the program unchanged.
    pub fn edit(&mut self, module: ModuleId) -> ModuleEdit<'_> {
        let work = self.modules.get(&module).expect("no such module").clone();
        ModuleEdit {
            program: self,
            work,
        }
    }

    /// Modules in the requested emission order.
    ///
    /// Derived orderings never mutate region order.
    pub fn emission_order(&self, order: EmitOrder) -> Vec<ModuleId> {
        match order {
            EmitOrder::Library => {
                let mut out = Vec::with_capacity(self.modules.len());
                for file in &self.files {
                    out.extend(
                        self.modules
                            .iter()
                            .filter(|(_, m)| &m.file == file)
                            .map(|(id, _)| *id),
                    );
                }
                // Modules of unregistered files keep insertion order.
                for (id, _) in self.modules.iter() {
                    if !out.contains(id) {
                        out.push(*id);
                    }
                }
                out
            }
            EmitOrder::Design => {
                let Some(entry) = self.entry else {
                    return self.emission_order(EmitOrder::Library);
                };
                let _guard = span!(Level::DEBUG, "design emission order", %entry).entered();
                let mut out = Vec::new();
                let mut visited = HashMap::new();
                self.post_order(entry, &mut visited, &mut out);
                out
            }
        }
    }

    fn post_order(
        &self,
        id: ModuleId,
        visited: &mut HashMap<ModuleId, ()>,
        out: &mut Vec<ModuleId>,
    ) {
        if visited.insert(id, ()).is_some() {
            return;
        }
        if let Some(module) = self.module(id) {
            for (_, inst) in module.instances() {
                if let ChildRef::Module(child) = inst.child() {
                    self.post_order(child, visited, out);
                }
            }
        }
        out.push(id);
    }
}

/// A transaction over a single module.
///
/// Compound edits (merge, split, rewire, clone) decompose into the
/// primitives below.
pub struct ModuleEdit<'a> {
    program: &'a mut Program,
    work: Module,
}

impl ModuleEdit<'_> {
    /// Creates a net in the working snapshot.
    pub fn create_net(&mut self, name: impl Into<ArcStr>, is_port: bool) -> NetId {
        self.program.net_id += 1;
        let id = NetId(self.program.net_id);
        self.work.nets.insert(
            id,
            Net {
                id,
                name: name.into(),
                is_port,
                endpoints: IndexMap::new(),
                attrs: IndexMap::new(),
                pattern_origin: None,
            },
        );
        id
    }

    /// Deletes a net and the endpoints it owns.
    pub fn delete_net(&mut self, id: NetId) {
        self.work.nets.shift_remove(&id);
        self.work.ports.retain(|p| *p != id);
    }

    /// Creates an instance in the working snapshot.
    pub fn create_instance(
        &mut self,
        name: impl Into<ArcStr>,
        child: ChildRef,
        ref_raw: impl Into<ArcStr>,
    ) -> InstanceId {
        self.program.instance_id += 1;
        let id = InstanceId(self.program.instance_id);
        self.work.instances.insert(
            id,
            Instance {
                id,
                name: name.into(),
                child,
                ref_raw: ref_raw.into(),
                props: IndexMap::new(),
                pattern_origin: None,
            },
        );
        id
    }

    /// Deletes an instance, detaching its endpoints from every net.
    pub fn delete_instance(&mut self, id: InstanceId) {
        self.work.instances.shift_remove(&id);
        for net in self.work.nets.values_mut() {
            net.endpoints.retain(|_, e| e.inst != id);
        }
    }

    /// Attaches an endpoint to a net.
    pub fn attach(
        &mut self,
        net: NetId,
        inst: InstanceId,
        port_path: impl Into<ArcStr>,
    ) -> EndpointId {
        self.program.endpoint_id += 1;
        let id = EndpointId(self.program.endpoint_id);
        let net = self.work.nets.get_mut(&net).expect("no such net");
        net.endpoints.insert(
            id,
            Endpoint {
                id,
                inst,
                port_path: port_path.into(),
                pattern_origin: None,
            },
        );
        id
    }

    /// Detaches an endpoint from whichever net owns it.
    pub fn detach(&mut self, endpoint: EndpointId) {
        for net in self.work.nets.values_mut() {
            net.endpoints.shift_remove(&endpoint);
        }
    }

    /// Sets an instance parameter value.
    pub fn set_instance_prop(
        &mut self,
        inst: InstanceId,
        key: impl Into<ArcStr>,
        value: impl Into<ArcStr>,
    ) {
        if let Some(inst) = self.work.instances.get_mut(&inst) {
            inst.props.insert(key.into(), value.into());
        }
    }

    /// Sets a net attribute.
    pub fn set_net_attr(
        &mut self,
        net: NetId,
        key: impl Into<ArcStr>,
        value: impl Into<ArcStr>,
    ) {
        if let Some(net) = self.work.nets.get_mut(&net) {
            net.attrs.insert(key.into(), value.into());
        }
    }

    /// Renames an instance.
    pub fn rename_instance(&mut self, inst: InstanceId, name: impl Into<ArcStr>) {
        if let Some(inst) = self.work.instances.get_mut(&inst) {
            inst.name = name.into();
        }
    }

    /// Renames a net.
    pub fn rename_net(&mut self, net: NetId, name: impl Into<ArcStr>) {
        if let Some(net) = self.work.nets.get_mut(&net) {
            net.name = name.into();
        }
    }

    /// A view of the working snapshot.
    pub fn working(&self) -> &Module {
        &self.work
    }

    /// Validates the working snapshot and, if it is sound, swaps it into
    /// the program.
    ///
    /// On failure the program is left exactly as it was before the
    /// transaction and the issues are returned.
    pub fn commit(self) -> Result<(), DiagnosticSet> {
        let issues = validation::validate_module(self.program, &self.work);
        if issues.has_error() {
            return Err(issues);
        }
        let id = self.work.id;
        self.program.modules.insert(id, self.work);
        Ok(())
    }
}
