mod common;
mod reminders;
mod sla_pass;
