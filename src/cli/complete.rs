use std::io::{self, Write};

use llmroute::chat::Message;
use llmroute::providers::{FinishReason, GenerationOptions};

use super::{read_prompt, Context};
use crate::utils::errors::error_chain;
use crate::{die, warn, CompleteArgs};

pub(crate) async fn complete_cmd(ctx: &Context, args: &CompleteArgs) {
    let workspace = ctx.workspace(args.workspace.as_deref());
    let model = ctx.model(args.model.as_deref());
    let prompt = read_prompt(args.prompt.as_deref());

    let service = match ctx.router().get_service(&workspace, &model).await {
        Ok(service) => service,
        Err(err) => die!("{}", error_chain(&err)),
    };

    let options = GenerationOptions {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        seed: args.seed,
        ..Default::default()
    };

    let mut messages = Vec::new();

    if let Some(system) = &args.system {
        messages.push(Message::system(system.as_str()));
    }

    messages.push(Message::user(prompt));

    let mut completion = match service.stream_completion(&model, &messages, &options).await {
        Ok(completion) => completion,
        Err(err) => die!("{}", error_chain(&err)),
    };

    while let Some(delta) = completion.next().await {
        match delta {
            Ok(delta) => {
                print!("{}", delta.content);

                if let Err(err) = io::stdout().flush() {
                    die!("failed to write the completion: {}", err);
                }
            }
            Err(err) => {
                println!();
                die!("the completion failed: {}", error_chain(&err));
            }
        }
    }

    println!();

    match completion.finish_reason() {
        Some(FinishReason::Length) => warn!("the completion was cut short by the token limit"),
        Some(FinishReason::ContentFilter) => {
            warn!("the completion was stopped by a content filter")
        }
        _ => {}
    }

    if let Some(usage) = completion.usage() {
        tracing::info!(
            prompt_tokens = ?usage.prompt_tokens,
            completion_tokens = ?usage.completion_tokens,
            "completion finished"
        );
    }
}
