mod common;

mod dsr;
