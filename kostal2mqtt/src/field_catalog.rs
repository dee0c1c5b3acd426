//! Declarative mapping from inverter process data points onto canonical record fields.
//!
//! The same short identifier means different things in different modules: `P` is the AC
//! output on `devices:local:ac`, the string power on `devices:local:pv1`, and the battery power
//! on `devices:local:battery`. Firmware releases also renamed a number of identifiers, so each
//! mapping lists every known spelling. Identifiers are compared case-insensitively.

use std::collections::BTreeMap;

use crate::canonical_record::CanonicalKey;

pub const MODULE_LOCAL: &str = "devices:local";
pub const MODULE_AC: &str = "devices:local:ac";
pub const MODULE_PV1: &str = "devices:local:pv1";
pub const MODULE_PV2: &str = "devices:local:pv2";
pub const MODULE_BATTERY: &str = "devices:local:battery";
pub const MODULE_STATISTIC: &str = "scb:statistic:EnergyFlow";

/// Module id -> process data ids to request from the device.
pub type ModuleRequests = BTreeMap<String, Vec<String>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleScope {
    /// The identifier only has this meaning inside the given module.
    Module(&'static str),
    /// The identifier is unique on its own and matches whichever module reports it.
    /// `queried_from` is the module the bridge asks for it.
    Any { queried_from: &'static str },
}

impl ModuleScope {
    pub fn queried_module(&self) -> &'static str {
        match *self {
            ModuleScope::Module(module) => module,
            ModuleScope::Any { queried_from } => queried_from,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitScale {
    Unit,
    /// Wh -> kWh, g -> kg
    Milli,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    Real,
    /// vendor state codes, truncated to an integer
    StateCode,
}

#[derive(Debug)]
pub struct FieldMapping {
    pub scope: ModuleScope,
    /// Known spellings of the identifier; the first is the current one.
    pub source_ids: &'static [&'static str],
    pub key: CanonicalKey,
    pub unit_scale: UnitScale,
    pub transform: Transform,
}

impl FieldMapping {
    const fn new(
        scope: ModuleScope,
        source_ids: &'static [&'static str],
        key: CanonicalKey,
    ) -> Self {
        Self {
            scope,
            source_ids,
            key,
            unit_scale: UnitScale::Unit,
            transform: Transform::Real,
        }
    }

    const fn milli(mut self) -> Self {
        self.unit_scale = UnitScale::Milli;
        self
    }

    const fn state_code(mut self) -> Self {
        self.transform = Transform::StateCode;
        self
    }

    fn matches_id(&self, identifier: &str) -> bool {
        self.source_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(identifier))
    }

    /// Converts a raw device value into the unit of the canonical field.
    pub fn convert(&self, raw: f64) -> f64 {
        let scaled = match self.unit_scale {
            UnitScale::Unit => raw,
            UnitScale::Milli => raw / 1000.0,
        };
        match self.transform {
            Transform::Real => scaled,
            Transform::StateCode => scaled.trunc(),
        }
    }
}

const STATISTIC: ModuleScope = ModuleScope::Any {
    queried_from: MODULE_STATISTIC,
};

pub static CATALOG: &[FieldMapping] = &[
    // aggregate values of the whole inverter
    FieldMapping::new(ModuleScope::Module(MODULE_LOCAL), &["P"], CanonicalKey::Power),
    FieldMapping::new(ModuleScope::Module(MODULE_LOCAL), &["Dc_P"], CanonicalKey::DcPower),
    FieldMapping::new(
        ModuleScope::Module(MODULE_LOCAL),
        &["Grid_P"],
        CanonicalKey::GridPower,
    ),
    FieldMapping::new(
        ModuleScope::Module(MODULE_LOCAL),
        &["Home_P"],
        CanonicalKey::HomeConsumption,
    ),
    FieldMapping::new(
        ModuleScope::Module(MODULE_LOCAL),
        &["HomeOwn_P"],
        CanonicalKey::HomeOwn,
    ),
    FieldMapping::new(
        ModuleScope::Module(MODULE_LOCAL),
        &["Inverter:Temperature", "Temperature"],
        CanonicalKey::Temperature,
    ),
    FieldMapping::new(
        ModuleScope::Module(MODULE_LOCAL),
        &["Inverter:State"],
        CanonicalKey::InverterState,
    )
    .state_code(),
    // AC stage
    FieldMapping::new(ModuleScope::Module(MODULE_AC), &["P"], CanonicalKey::AcPower),
    FieldMapping::new(
        ModuleScope::Module(MODULE_AC),
        &["L1_U", "U"],
        CanonicalKey::VoltageAc,
    ),
    FieldMapping::new(
        ModuleScope::Module(MODULE_AC),
        &["Frequency", "Grid_F"],
        CanonicalKey::Frequency,
    ),
    // DC strings
    FieldMapping::new(ModuleScope::Module(MODULE_PV1), &["U"], CanonicalKey::VoltageDc1),
    FieldMapping::new(ModuleScope::Module(MODULE_PV1), &["I"], CanonicalKey::CurrentDc1),
    FieldMapping::new(ModuleScope::Module(MODULE_PV1), &["P"], CanonicalKey::PowerDc1),
    FieldMapping::new(ModuleScope::Module(MODULE_PV2), &["U"], CanonicalKey::VoltageDc2),
    FieldMapping::new(ModuleScope::Module(MODULE_PV2), &["I"], CanonicalKey::CurrentDc2),
    FieldMapping::new(ModuleScope::Module(MODULE_PV2), &["P"], CanonicalKey::PowerDc2),
    // battery
    FieldMapping::new(
        ModuleScope::Module(MODULE_BATTERY),
        &["P"],
        CanonicalKey::BatteryPower,
    ),
    // daily and lifetime statistics, reported in Wh and g
    FieldMapping::new(
        STATISTIC,
        &["Statistic:Yield:Day", "Yield:Day"],
        CanonicalKey::EnergyToday,
    )
    .milli(),
    FieldMapping::new(
        STATISTIC,
        &["Statistic:Yield:Total", "Yield:Total"],
        CanonicalKey::EnergyTotal,
    )
    .milli(),
    FieldMapping::new(
        STATISTIC,
        &["Statistic:CO2Saving:Day", "CO2Saving:Day"],
        CanonicalKey::Co2SavingToday,
    )
    .milli(),
    FieldMapping::new(
        STATISTIC,
        &["Statistic:Autarky:Day", "Autarky:Day"],
        CanonicalKey::AutarkyToday,
    ),
    FieldMapping::new(
        STATISTIC,
        &["Statistic:OwnConsumptionRate:Day", "OwnConsumptionRate:Day"],
        CanonicalKey::OwnConsumptionRate,
    ),
];

/// Resolves a process data point to its catalog entry. Module-scoped entries win over
/// entries that match any module.
pub fn lookup(module_id: &str, identifier: &str) -> Option<&'static FieldMapping> {
    let scoped = CATALOG.iter().find(|mapping| match mapping.scope {
        ModuleScope::Module(module) => {
            module.eq_ignore_ascii_case(module_id) && mapping.matches_id(identifier)
        }
        ModuleScope::Any { .. } => false,
    });
    scoped.or_else(|| {
        CATALOG.iter().find(|mapping| {
            matches!(mapping.scope, ModuleScope::Any { .. }) && mapping.matches_id(identifier)
        })
    })
}

/// Every identifier spelling the catalog knows, grouped by the module it is requested from.
pub fn module_requests() -> ModuleRequests {
    let mut requests = ModuleRequests::new();
    for mapping in CATALOG {
        let ids = requests
            .entry(mapping.scope.queried_module().to_string())
            .or_default();
        ids.extend(mapping.source_ids.iter().map(|id| id.to_string()));
    }
    requests
}
