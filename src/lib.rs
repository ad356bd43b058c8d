pub mod atmosphere;
