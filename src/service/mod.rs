//! Domain services shared by the routers.

pub mod lead_csv;
pub mod leads;
pub mod membership;
pub mod notification;
pub mod settings;

pub use leads::LeadService;
pub use membership::MembershipService;
pub use notification::{Event, NotificationPublisher, NotificationService};
pub use settings::SettingsService;
