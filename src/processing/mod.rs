pub mod accumulate;
pub mod assemble;
pub mod mask;
pub mod zorder;
