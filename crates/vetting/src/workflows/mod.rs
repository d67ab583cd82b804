pub mod background_checks;
