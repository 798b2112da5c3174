//! The frozen, literal-only netlist representation.
//!
//! NetlistIR is the projection of an atomized GraphIR that emission
//! consumes: every name is a literal atom, connections are explicit
//! `(port, net)` pairs in the child's port order, and nothing refers back
//! to GraphIR entities. A design is built once by the projection and
//! never mutated afterwards.

#![warn(missing_docs)]

pub mod verify;
#[cfg(test)]
pub(crate) mod tests;

use arcstr::ArcStr;
use diagnostics::FileId;
use graphir::DeviceBackend;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Whether an instance refers to a module or a device.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ChildKind {
    /// A hierarchical child module, emitted as a subcircuit call.
    Module,
    /// A leaf device, emitted through its backend template.
    Device,
}

/// A literal reference to a module or device by file identity and name.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetlistRef {
    /// Module or device.
    pub kind: ChildKind,
    /// The referenced symbol name.
    pub name: ArcStr,
    /// The file defining the referenced symbol.
    pub file: FileId,
}

/// A named connection of one instance port to one net.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetlistConn {
    /// The port on the referenced module or device.
    pub port: ArcStr,
    /// The net in the enclosing module.
    pub net: ArcStr,
}

/// A literal instance with explicit named connections.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetlistInstance {
    /// The instance name.
    pub name: ArcStr,
    /// The referenced module or device.
    pub child: NetlistRef,
    /// Parameter values after `{var}` substitution and pattern
    /// expansion, in authoring order.
    pub params: IndexMap<ArcStr, ArcStr>,
    /// Named connections in net region order.
    pub conns: Vec<NetlistConn>,
}

impl NetlistInstance {
    /// The net connected to the given port, if any.
    pub fn conn(&self, port: &str) -> Option<&ArcStr> {
        self.conns
            .iter()
            .find(|c| c.port == port)
            .map(|c| &c.net)
    }
}

/// A module with fully literal names.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetlistModule {
    /// The module name.
    pub name: ArcStr,
    /// The defining file.
    pub file_id: FileId,
    /// Port names in derived port order.
    pub ports: Vec<ArcStr>,
    /// All net names, ports included, in region order.
    pub nets: Vec<ArcStr>,
    /// Instances in region order.
    pub instances: Vec<NetlistInstance>,
    /// The module's interned pattern expressions, for presentation.
    pub pattern_expression_table: Option<IndexMap<u64, ArcStr>>,
}

/// A leaf device carried through for emission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetlistDevice {
    /// The device name.
    pub name: ArcStr,
    /// The defining file.
    pub file_id: FileId,
    /// Declared port order; may be empty.
    pub ports: Vec<ArcStr>,
    /// Device-level parameter defaults.
    pub parameters: IndexMap<ArcStr, ArcStr>,
    /// Device-level variables.
    pub variables: IndexMap<ArcStr, ArcStr>,
    /// Per-backend templates and overrides.
    pub backends: IndexMap<ArcStr, DeviceBackend>,
}

/// An emission-ready design.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetlistDesign {
    /// Modules in program order (entry file first).
    pub modules: Vec<NetlistModule>,
    /// Devices in program order.
    pub devices: Vec<NetlistDevice>,
    /// The `top` name declared by the entry file, if any.
    pub top: Option<ArcStr>,
    /// The entry file, when the design was compiled from one.
    pub entry_file_id: Option<FileId>,
}

impl NetlistDesign {
    /// The module with the given identity.
    pub fn module(&self, file: &FileId, name: &str) -> Option<&NetlistModule> {
        self.modules
            .iter()
            .find(|m| &m.file_id == file && m.name == name)
    }

    /// The device with the given identity.
    pub fn device(&self, file: &FileId, name: &str) -> Option<&NetlistDevice> {
        self.devices
            .iter()
            .find(|d| &d.file_id == file && d.name == name)
    }

    /// Modules defined in the given file, in region order.
    pub fn modules_in<'a>(
        &'a self,
        file: &'a FileId,
    ) -> impl Iterator<Item = &'a NetlistModule> {
        self.modules.iter().filter(move |m| &m.file_id == file)
    }
}
