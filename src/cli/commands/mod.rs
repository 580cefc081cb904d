pub mod context;
pub mod decode;
pub mod fetch;
pub mod test_oracle;
pub mod transition;
