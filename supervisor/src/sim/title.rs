//! Installed-title descriptions for the simulated loader.

use crate::platform::{CoreInfo, Descriptor, ServiceName, StorageInfo, TitleId};
use crate::reslimit::ReslimitCategory;

/// How a simulated process reacts to a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitBehavior {
    /// Exits as soon as the request is delivered.
    OnRequest,
    /// Ignores requests; only a kill or [`super::SimPlatform::exit`] ends it.
    Never,
}

/// A title the simulated loader can register and load.
#[derive(Debug, Clone)]
pub struct SimTitle {
    pub(super) descriptor: Descriptor,
    pub(super) core_version: Option<u32>,
    pub(super) exit: ExitBehavior,
    pub(super) fails_to_load: bool,
}

impl SimTitle {
    fn new(title_id: TitleId, category: ReslimitCategory) -> Self {
        SimTitle {
            descriptor: Descriptor {
                title_id,
                core: CoreInfo {
                    priority: 0x30,
                    affinity_mask: 1,
                    ideal_processor: 0,
                    ..CoreInfo::default()
                },
                stack_size: 0x4000,
                storage: StorageInfo::default(),
                reslimit_category: category as u8,
                ..Descriptor::default()
            },
            core_version: None,
            exit: ExitBehavior::OnRequest,
            fails_to_load: false,
        }
    }

    /// A background service, limited by the OTHER category.
    pub fn sysmodule(title_id: TitleId) -> Self {
        Self::new(title_id, ReslimitCategory::Other)
    }

    /// A program limited by the APPLICATION category.
    pub fn application(title_id: TitleId) -> Self {
        Self::new(title_id, ReslimitCategory::Application)
    }

    pub fn title_id(&self) -> TitleId {
        self.descriptor.title_id
    }

    pub fn depends_on(mut self, dependencies: &[TitleId]) -> Self {
        self.descriptor.dependencies.extend_from_slice(dependencies);
        self
    }

    pub fn services(mut self, names: &[&str]) -> Self {
        self.descriptor
            .service_access
            .extend(names.iter().map(|name| ServiceName::new(name)));
        self
    }

    pub fn cpu_time(mut self, cpu_time: u16) -> Self {
        self.descriptor.cpu_time = cpu_time;
        self
    }

    pub fn reslimit_category(mut self, category: u8) -> Self {
        self.descriptor.reslimit_category = category;
        self
    }

    pub fn core(mut self, core: CoreInfo) -> Self {
        self.descriptor.core = core;
        self
    }

    /// Defaults to the platform's own core version.
    pub fn core_version(mut self, version: u32) -> Self {
        self.core_version = Some(version);
        self
    }

    pub fn ignores_termination(mut self) -> Self {
        self.exit = ExitBehavior::Never;
        self
    }

    pub fn fails_to_load(mut self) -> Self {
        self.fails_to_load = true;
        self
    }
}
