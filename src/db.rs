pub mod tracking_repo;
pub use tracking_repo::{TrackingRepository, TrackingStore};
pub mod task_repo;
pub use task_repo::{TaskRepository, TaskStore};
pub mod finance_repo;
pub use finance_repo::{FinanceRepository, InvoiceStore};
pub mod notification_repo;
pub use notification_repo::{NotificationRepository, NotificationStore};
pub mod crm_repo;
pub use crm_repo::{ContactStore, CrmRepository};
pub mod whatsapp_repo;
pub use whatsapp_repo::{OutboundMessageStore, WhatsAppRepository};

#[cfg(test)]
pub mod memory;
