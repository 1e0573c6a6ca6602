//! `plugstrap list`: show the plan without touching disk or network.

use super::Context;
use crate::render;

/// Print phases and plugins with their resolved strategies.
pub fn execute_list(ctx: &Context) {
    print!("{}", render::plan_listing(&ctx.plan));
}
