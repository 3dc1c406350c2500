use strum::IntoEnumIterator;
use table::Table;
mod table;

use llmroute::providers::LlmProvider;

use super::Context;
use crate::utils::errors::error_chain;
use crate::{die, warn, ListArgs, ListObject, ListingFormat};

#[derive(serde::Serialize)]
struct ProvidedModel {
    model_id: String,
    provider: LlmProvider,
    context: Option<u64>,
}

impl From<Vec<ProvidedModel>> for Table {
    fn from(value: Vec<ProvidedModel>) -> Self {
        let mut tab = Table::with_header(vec!["MODEL", "PROVIDER", "CONTEXT"]);

        for model in value {
            tab.add_row(vec![
                model.model_id,
                model.provider.to_string(),
                match model.context {
                    Some(context) => context.to_string(),
                    None => "unknown".to_string(),
                },
            ]);
        }

        tab
    }
}

#[derive(serde::Serialize)]
struct Provider {
    provider: LlmProvider,
    registered: bool,
    priority: Option<u8>,
}

impl From<Vec<Provider>> for Table {
    fn from(value: Vec<Provider>) -> Self {
        let mut tab = Table::with_header(vec!["PROVIDER", "STATUS", "PRIORITY"]);

        for provider in value {
            tab.add_row(vec![
                provider.provider.to_string(),
                if provider.registered {
                    "registered".to_string()
                } else {
                    "inactive".to_string()
                },
                match provider.priority {
                    Some(priority) => priority.to_string(),
                    None => "-".to_string(),
                },
            ]);
        }

        tab
    }
}

fn get_providers(ctx: &Context) -> Vec<Provider> {
    let registry = ctx.router().snapshot();

    LlmProvider::iter()
        .map(|id| Provider {
            provider: id,
            registered: registry.get_factory(id).is_ok(),
            priority: registry.priority(id),
        })
        .collect()
}

async fn get_models_for_provider(
    ctx: &Context,
    workspace: &str,
    id: LlmProvider,
) -> Result<Vec<ProvidedModel>, String> {
    let service = ctx
        .router()
        .build_service(workspace, id)
        .await
        .map_err(|err| error_chain(&err))?;

    let models = service.models().await.map_err(|err| error_chain(&err))?;

    Ok(models
        .into_iter()
        .map(|m| ProvidedModel {
            model_id: m.id,
            provider: id,
            context: m.context_length,
        })
        .collect())
}

async fn get_registered_models(ctx: &Context, workspace: &str) -> Vec<ProvidedModel> {
    let mut models = Vec::new();

    for id in ctx.router().snapshot().providers() {
        // One unreachable backend should not hide the others.
        match get_models_for_provider(ctx, workspace, id).await {
            Ok(provided) => models.extend(provided),
            Err(err) => warn!("skipping provider \"{}\": {}", id, err),
        }
    }

    models
}

fn format_output<O: Into<Table> + serde::Serialize>(object: O, format: ListingFormat) {
    match format {
        ListingFormat::Json => match serde_json::to_string_pretty(&object) {
            Ok(output) => println!("{}", output),
            Err(err) => die!("failed to serialize the listing: {}", err),
        },
        ListingFormat::Table => {
            let tab: Table = object.into();

            print!("{}", tab);
        }
        ListingFormat::HeaderlessTable => {
            let mut tab: Table = object.into();

            tab.print_header(false);

            print!("{}", tab);
        }
    }
}

pub(crate) async fn list_cmd(ctx: &Context, args: &ListArgs) {
    let format = args.format;

    match &args.object {
        ListObject::Models(args) => {
            let workspace = ctx.workspace(args.workspace.as_deref());

            let models = match args.provider {
                Some(id) => match get_models_for_provider(ctx, &workspace, id).await {
                    Ok(models) => models,
                    Err(err) => die!("failed to list models: {}", err),
                },
                None => get_registered_models(ctx, &workspace).await,
            };

            format_output(models, format);
        }
        ListObject::Providers => {
            let providers = get_providers(ctx);
            format_output(providers, format);
        }
    }
}
