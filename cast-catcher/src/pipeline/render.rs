use crate::error::CatcherError;
use crate::layout::{INDEX_TEMPLATE, Layout};
use crate::pipeline::models::ParsedPodcasts;
use minijinja::{AutoEscape, Environment, context};

/// Render `templates/main.html` with `feeddict` bound to the parsed podcasts.
///
/// Field content is inserted verbatim.
#[tracing::instrument(skip_all, fields(podcasts = podcasts.len()))]
pub async fn render(layout: &Layout, podcasts: &ParsedPodcasts) -> Result<(), CatcherError> {
    let templates = layout.templates.clone();
    let index = layout.index.clone();
    let podcasts = podcasts.clone();

    tokio::task::spawn_blocking(move || {
        let mut environment = Environment::new();
        environment.set_loader(minijinja::path_loader(templates));
        environment.set_auto_escape_callback(|_| AutoEscape::None);

        let html = environment
            .get_template(INDEX_TEMPLATE)?
            .render(context! { feeddict => podcasts })?;

        std::fs::write(&index, html)?;
        tracing::info!("Rendered {}", index.display());

        Ok::<_, CatcherError>(())
    })
    .await
    .map_err(std::io::Error::other)?
}
