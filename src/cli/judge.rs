use llmroute::chat::Message;
use llmroute::providers::ModelParameters;

use super::{read_prompt, Context};
use crate::utils::errors::error_chain;
use crate::{die, JudgeArgs};

pub(crate) async fn judge_cmd(ctx: &Context, args: &JudgeArgs) {
    let parameters: ModelParameters = match serde_json::from_str(&args.parameters) {
        Ok(parameters) => parameters,
        Err(err) => die!("invalid model parameters: {}", err),
    };

    let workspace = ctx.workspace(args.workspace.as_deref());
    let prompt = read_prompt(args.prompt.as_deref());

    let model = match ctx.router().get_language_model(&workspace, &parameters).await {
        Ok(model) => model,
        Err(err) => die!("{}", error_chain(&err)),
    };

    tracing::debug!(provider = %model.provider(), model = model.model_name(), "judging");

    let response = match model.chat(&[Message::user(prompt)]).await {
        Ok(response) => response,
        Err(err) => die!("the model failed to respond: {}", error_chain(&err)),
    };

    println!("{}", response.message.content);
}
