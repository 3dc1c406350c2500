use super::Context;
use crate::utils::errors::error_chain;
use crate::{die, ResolveArgs};

pub(crate) fn resolve_cmd(ctx: &Context, args: &ResolveArgs) {
    match ctx.router().get_llm_provider(&args.model) {
        Ok(provider) => println!("{}", provider),
        Err(err) => die!("{}", error_chain(&err)),
    }
}
