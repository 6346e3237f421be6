pub mod excellon;
pub mod gerber;
pub mod ipcd356a;
pub mod pnp;
