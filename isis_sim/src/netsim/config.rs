// IsisSim: Link-State Routing on a Simulated Network
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Network Configuration
//! This module represents the network configuration. There are several different structs in this
//! module. Here is an overview:
//!
//! - [`Config`]: Network-wide configuration. The datastructure is a collection of several
//!   [`ConfigExpr`].
//! - [`ConfigExpr`]: Single configuration expresison (line in a router configuraiton).
//! - [`ConfigPatch`]: Difference between two [`Config`] structs. The datastructure is a collection
//!   of several [`ConfigModifier`].
//! - [`ConfigModifier`]: A modification of a single [`ConfigExpr`] in a configuration. A
//!   modification can either be an insertion of a new expression, a removal of an existing
//!   expression, or a moification of an existing expression.
//!
//! # Example Usage
//!
//! ```rust
//! use isis_sim::netsim::config::{Config, ConfigExpr::*, ConfigModifier};
//! use isis_sim::netsim::{ConfigError, IfIndex};
//!
//! fn main() -> Result<(), ConfigError> {
//!     let r0 = 0.into();
//!     let r1 = 1.into();
//!
//!     let mut c1 = Config::new();
//!     let mut c2 = Config::new();
//!
//!     // enable the protocol on both routers in both configs
//!     c1.add(IsisRouter { router: r0 })?;
//!     c2.add(IsisRouter { router: r0 })?;
//!     c1.add(IsisRouter { router: r1 })?;
//!     c2.add(IsisRouter { router: r1 })?;
//!
//!     // only c2 enables interface 1 of r0
//!     c2.add(IsisInterface { router: r0, ifindex: IfIndex(1) })?;
//!
//!     // both set a cost, but differently
//!     c1.add(InterfaceCost { router: r1, ifindex: IfIndex(1), cost: 10 })?;
//!     c2.add(InterfaceCost { router: r1, ifindex: IfIndex(1), cost: 20 })?;
//!
//!     // Compute the patch (difference between c1 and c2)
//!     let patch = c1.get_diff(&c2);
//!     // Apply the patch to c1
//!     c1.apply_patch(&patch)?;
//!     // c1 should now be equal to c2
//!     assert_eq!(c1, c2);
//!
//!     Ok(())
//! }
//! ```

use crate::netsim::route_map::{RouteMap, RouteMapDirection};
use crate::netsim::{ConfigError, Cost, DeviceId, IfIndex, Prefix};

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

/// # Network Configuration
/// This struct represents the configuration of a network. It is made up of several *unordered*
/// [`ConfigExpr`]. Two configurations can be compared by computing the difference, which returns a
/// [`ConfigPatch`].
///
/// In comparison to the Patch, a `Config` struct is unordered, which means that it just represents
/// the configuration, but not the way how it got there.
///
/// The `Config` struct contains only "unique" `ConfigExpr`. This means, that a config cannot have
/// an expression setting the cost of an interface to 10, and another expression setting the cost
/// of the same interface to 20.
#[derive(Debug, Clone)]
pub struct Config {
    /// All lines of configuration
    pub(crate) expr: HashMap<ConfigExprKey, ConfigExpr>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self { expr: HashMap::new() }
    }

    /// Add a single configuration expression. This fails if a similar expression already exists.
    pub fn add(&mut self, expr: ConfigExpr) -> Result<(), ConfigError> {
        // check if there is an expression which this one would overwrite
        if let Some(old_expr) = self.expr.insert(expr.key(), expr) {
            self.expr.insert(old_expr.key(), old_expr);
            Err(ConfigError::ConfigExprOverload)
        } else {
            Ok(())
        }
    }

    /// Apply a single `ConfigModifier` to the configuration, updating the `Config` struct. This
    /// function checks if the modifier can be applied. If the modifier inserts an already existing
    /// expression, or if the modifier removes or updates a non-existing expression, the function
    /// will return an error, and the `Config` struct will remain untouched.
    ///
    /// For Modifiers of type `ConfigModifier::Update`, both expressions must produce the same
    /// `ConfigExprKey`, and the `from` expression must match the existing one.
    pub fn apply_modifier(&mut self, modifier: &ConfigModifier) -> Result<(), ConfigError> {
        match modifier {
            ConfigModifier::Insert(expr) => {
                if let Some(old_expr) = self.expr.insert(expr.key(), expr.clone()) {
                    self.expr.insert(old_expr.key(), old_expr);
                    return Err(ConfigError::ConfigModifierError(modifier.clone()));
                }
            }
            ConfigModifier::Remove(expr) => match self.expr.remove(&expr.key()) {
                Some(old_expr) if &old_expr != expr => {
                    self.expr.insert(old_expr.key(), old_expr);
                    return Err(ConfigError::ConfigModifierError(modifier.clone()));
                }
                None => return Err(ConfigError::ConfigModifierError(modifier.clone())),
                _ => {}
            },
            ConfigModifier::Update { from: expr_a, to: expr_b } => {
                let key = expr_a.key();
                if key != expr_b.key() {
                    return Err(ConfigError::ConfigModifierError(modifier.clone()));
                }
                match self.expr.remove(&key) {
                    Some(old_expr) if &old_expr != expr_a => {
                        self.expr.insert(key, old_expr);
                        return Err(ConfigError::ConfigModifierError(modifier.clone()));
                    }
                    None => return Err(ConfigError::ConfigModifierError(modifier.clone())),
                    _ => {}
                }
                self.expr.insert(key, expr_b.clone());
            }
        };
        Ok(())
    }

    /// Apply a patch on the current configuration. `self` will be updated to reflect all chages in
    /// the patch. The function will return an error if the patch cannot be applied. If an error
    /// occurs, the config will remain untouched.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        let mut config_before = self.expr.clone();
        for modifier in patch.modifiers.iter() {
            if let Err(e) = self.apply_modifier(modifier) {
                // undo all changes
                std::mem::swap(&mut self.expr, &mut config_before);
                return Err(e);
            }
        }
        Ok(())
    }

    /// returns a ConfigPatch containing the difference between self and other
    /// When the patch is applied on self, it will be the same as other.
    ///
    /// The patch is ordered such that it can be applied on a running network: removals first
    /// (most specific expressions first), then updates, then insertions (protocol instances
    /// first). See [`ConfigExprKey::rank`].
    pub fn get_diff(&self, other: &Self) -> ConfigPatch {
        let self_keys: HashSet<&ConfigExprKey> = self.expr.keys().collect();
        let other_keys: HashSet<&ConfigExprKey> = other.expr.keys().collect();

        // expressions missing in other (must be removed)
        let mut removes: Vec<&ConfigExpr> =
            self_keys.difference(&other_keys).filter_map(|k| self.expr.get(k)).collect();
        removes.sort_by_key(|e| std::cmp::Reverse(e.key().rank()));

        // expressions missing in self (must be inserted)
        let mut inserts: Vec<&ConfigExpr> =
            other_keys.difference(&self_keys).filter_map(|k| other.expr.get(k)).collect();
        inserts.sort_by_key(|e| e.key().rank());

        let mut patch = ConfigPatch::new();
        removes.into_iter().for_each(|e| patch.add(ConfigModifier::Remove(e.clone())));

        // expressions which have changed
        for k in self_keys.intersection(&other_keys) {
            if let (Some(self_e), Some(other_e)) = (self.expr.get(k), other.expr.get(k)) {
                if self_e != other_e {
                    patch.add(ConfigModifier::Update { from: self_e.clone(), to: other_e.clone() })
                }
            }
        }

        inserts.into_iter().for_each(|e| patch.add(ConfigModifier::Insert(e.clone())));
        patch
    }

    /// Returns the expression stored at the key
    pub fn get(&self, key: &ConfigExprKey) -> Option<&ConfigExpr> {
        self.expr.get(key)
    }

    /// Returns the number of config expressions in the config.
    pub fn len(&self) -> usize {
        self.expr.len()
    }

    /// Returns `true` if the config is empty
    pub fn is_empty(&self) -> bool {
        self.expr.is_empty()
    }

    /// Returns an iterator over all expressions in the configuration.
    pub fn iter(&self) -> std::collections::hash_map::Values<ConfigExprKey, ConfigExpr> {
        self.expr.values()
    }
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.expr.len() == other.expr.len()
            && self.expr.iter().all(|(key, self_e)| other.expr.get(key) == Some(self_e))
    }
}

/// # Single configuration expression
/// The expression sets a specific thing in the network.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigExpr {
    /// Enable the link-state protocol on a router
    IsisRouter {
        /// Router to configure
        router: DeviceId,
    },
    /// Enable the protocol on an interface. The protocol must be enabled on the router.
    IsisInterface {
        /// Router to configure
        router: DeviceId,
        /// Interface to enable
        ifindex: IfIndex,
    },
    /// Set the cost of an interface. Without this expression, the default cost is used.
    InterfaceCost {
        /// Router to configure
        router: DeviceId,
        /// Interface
        ifindex: IfIndex,
        /// Cost (metric) of the interface
        cost: Cost,
    },
    /// Set the DIS priority of an interface
    InterfacePriority {
        /// Router to configure
        router: DeviceId,
        /// Interface
        ifindex: IfIndex,
        /// Priority, higher values win the election
        priority: u8,
    },
    /// Put an interface into a named flooding group
    InterfaceGroup {
        /// Router to configure
        router: DeviceId,
        /// Interface
        ifindex: IfIndex,
        /// Name of the group
        group: String,
    },
    /// Administrative overload, with an optional timeout in seconds
    Overload {
        /// Router to configure
        router: DeviceId,
        /// Overload clears itself after this many seconds
        timeout: Option<u32>,
    },
    /// Add a route map to the import policy
    ImportPolicy {
        /// Router to configure
        router: DeviceId,
        /// Route Map
        map: RouteMap,
    },
    /// Add a route map to the export policy
    ExportPolicy {
        /// Router to configure
        router: DeviceId,
        /// Route Map
        map: RouteMap,
    },
    /// Set a static route. Static routes are the externally learned prefixes a router may export
    /// into the protocol.
    StaticRoute {
        /// On which router set the static route
        router: DeviceId,
        /// For which prefix to set the static route
        prefix: Prefix,
        /// Gateway, which must be on a connected subnet
        next_hop: Ipv4Addr,
        /// Cost of the route
        cost: Cost,
    },
}

impl ConfigExpr {
    /// Returns the key of the config expression. The idea behind the key is that the `ConfigExpr`
    /// cannot be hashed and used as a key for a `HashMap`. But `ConfigExprKey` implements `Hash`,
    /// and can therefore be used as a key.
    pub fn key(&self) -> ConfigExprKey {
        match self {
            ConfigExpr::IsisRouter { router } => ConfigExprKey::IsisRouter { router: *router },
            ConfigExpr::IsisInterface { router, ifindex } => {
                ConfigExprKey::IsisInterface { router: *router, ifindex: *ifindex }
            }
            ConfigExpr::InterfaceCost { router, ifindex, .. } => {
                ConfigExprKey::InterfaceCost { router: *router, ifindex: *ifindex }
            }
            ConfigExpr::InterfacePriority { router, ifindex, .. } => {
                ConfigExprKey::InterfacePriority { router: *router, ifindex: *ifindex }
            }
            ConfigExpr::InterfaceGroup { router, ifindex, .. } => {
                ConfigExprKey::InterfaceGroup { router: *router, ifindex: *ifindex }
            }
            ConfigExpr::Overload { router, .. } => ConfigExprKey::Overload { router: *router },
            ConfigExpr::ImportPolicy { router, map } => ConfigExprKey::Policy {
                router: *router,
                direction: RouteMapDirection::Import,
                order: map.order,
            },
            ConfigExpr::ExportPolicy { router, map } => ConfigExprKey::Policy {
                router: *router,
                direction: RouteMapDirection::Export,
                order: map.order,
            },
            ConfigExpr::StaticRoute { router, prefix, .. } => {
                ConfigExprKey::StaticRoute { router: *router, prefix: *prefix }
            }
        }
    }

    /// Returns the router on which the configuration is applied.
    pub fn router(&self) -> DeviceId {
        match self {
            ConfigExpr::IsisRouter { router }
            | ConfigExpr::IsisInterface { router, .. }
            | ConfigExpr::InterfaceCost { router, .. }
            | ConfigExpr::InterfacePriority { router, .. }
            | ConfigExpr::InterfaceGroup { router, .. }
            | ConfigExpr::Overload { router, .. }
            | ConfigExpr::ImportPolicy { router, .. }
            | ConfigExpr::ExportPolicy { router, .. }
            | ConfigExpr::StaticRoute { router, .. } => *router,
        }
    }
}

/// # Key for Config Expressions
/// Key for a single configuration expression, where the value is missing. The idea  is that the
/// `ConfigExpr` does not implement `Hash` and `Eq`, and can therefore not be used as a key in a
/// `HashMap`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigExprKey {
    /// Protocol enabled on a router
    IsisRouter {
        /// Router
        router: DeviceId,
    },
    /// Protocol enabled on an interface
    IsisInterface {
        /// Router
        router: DeviceId,
        /// Interface
        ifindex: IfIndex,
    },
    /// Cost of an interface
    InterfaceCost {
        /// Router
        router: DeviceId,
        /// Interface
        ifindex: IfIndex,
    },
    /// Priority of an interface
    InterfacePriority {
        /// Router
        router: DeviceId,
        /// Interface
        ifindex: IfIndex,
    },
    /// Flooding group of an interface
    InterfaceGroup {
        /// Router
        router: DeviceId,
        /// Interface
        ifindex: IfIndex,
    },
    /// Administrative overload
    Overload {
        /// Router
        router: DeviceId,
    },
    /// Route map of the import or export policy
    Policy {
        /// Router
        router: DeviceId,
        /// Import or export
        direction: RouteMapDirection,
        /// order of the route map
        order: usize,
    },
    /// Key for setting a static route
    StaticRoute {
        /// Router to be configured
        router: DeviceId,
        /// Prefix for which to configure the router
        prefix: Prefix,
    },
}

impl ConfigExprKey {
    /// Dependency rank of the expression: interface settings require the protocol on the
    /// interface, which requires the protocol on the router.
    pub fn rank(&self) -> u8 {
        match self {
            ConfigExprKey::IsisRouter { .. } => 0,
            ConfigExprKey::IsisInterface { .. } => 1,
            ConfigExprKey::StaticRoute { .. } => 1,
            _ => 2,
        }
    }
}

/// # Config Modifier
/// A single patch to apply on a configuration. The modifier can either insert a new expression,
/// update an existing expression or remove an old expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigModifier {
    /// Insert a new expression
    Insert(ConfigExpr),
    /// Remove an existing expression
    Remove(ConfigExpr),
    /// Change a config expression
    Update {
        /// Original configuration expression
        from: ConfigExpr,
        /// New configuration expression, which replaces the `from` expression.
        to: ConfigExpr,
    },
}

impl ConfigModifier {
    /// Returns the ConfigExprKey for the config expression stored inside.
    pub fn key(&self) -> ConfigExprKey {
        match self {
            Self::Insert(e) => e.key(),
            Self::Remove(e) => e.key(),
            Self::Update { to, .. } => to.key(),
        }
    }

    /// Returns the router which will be updated by this modifier
    pub fn router(&self) -> DeviceId {
        match self {
            Self::Insert(e) => e.router(),
            Self::Remove(e) => e.router(),
            Self::Update { to, .. } => to.router(),
        }
    }

    /// Reverses the modifier. An insert becomes a remove, and viceversa. An update updates from the
    /// new one to the old one
    pub fn reverse(self) -> Self {
        match self {
            Self::Insert(e) => Self::Remove(e),
            Self::Remove(e) => Self::Insert(e),
            Self::Update { from, to } => Self::Update { from: to, to: from },
        }
    }
}

/// # Config Patch
/// A series of `ConfigModifiers` which can be applied on a `Config` to get a new `Config`. The
/// series is an ordered list, and the modifiers are applied in the order they were added.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigPatch {
    /// List of all modifiers, in the order in which they are applied.
    pub modifiers: Vec<ConfigModifier>,
}

impl ConfigPatch {
    /// Create an empty patch
    pub fn new() -> Self {
        Self { modifiers: Vec::new() }
    }

    /// Add a new modifier to the patch
    pub fn add(&mut self, modifier: ConfigModifier) {
        self.modifiers.push(modifier);
    }
}
