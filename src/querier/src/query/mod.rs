pub mod graphite;
