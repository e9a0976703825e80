use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api;
use crate::config;
use crate::controller::Services;
use crate::data::{self, CommentService, InteractionService, PostService};
use crate::logging;
use crate::navigation::TopNavigation;
use crate::privileges::{AllowAll, PrivilegeCheck, Privileges, Rank};
use crate::routes::Route;
use crate::settings::{self, Settings};
use crate::ui;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub route: Route,
    /// Browse built-in sample posts instead of talking to a server.
    pub offline: bool,
    pub config_file: Option<PathBuf>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    let log_note = match logging::init(&cfg.log) {
        Ok(Some(path)) => format!("Logging to {}.", friendly_path(&path)),
        Ok(None) => String::new(),
        Err(err) => format!("Logging disabled: {err}."),
    };

    let settings = settings::Handle::new(Settings {
        list_posts: cfg.browsing.list_posts.clone(),
    });
    let navigation = TopNavigation::new();

    let (services, status) = if options.offline {
        (offline_services(settings, navigation), "Offline sample posts.".to_string())
    } else {
        let services = api_services(&cfg.api, settings, navigation)?;
        (services, format!("Connected to {}.", cfg.api.base_url))
    };
    info!(route = %options.route.path(), offline = options.offline, "starting");

    let mut app = ui::App::new(ui::Options {
        services,
        route: options.route,
        theme: cfg.ui.theme.clone(),
        status_message: format!("{status} {log_note}").trim().to_string(),
    });
    app.run()
}

fn api_services(
    cfg: &config::ApiConfig,
    settings: settings::Handle,
    navigation: TopNavigation,
) -> Result<Services> {
    let credentials = cfg.has_credentials().then(|| api::Credentials {
        username: cfg.username.trim().to_string(),
        token: cfg.token.trim().to_string(),
    });
    let client = api::Client::new(api::ClientConfig {
        base_url: Some(cfg.base_url.clone()),
        user_agent: cfg.user_agent.clone(),
        credentials: credentials.clone(),
        timeout: Some(cfg.timeout),
        http_client: None,
    })
    .context("create api client")?;
    let client = Arc::new(client);

    let privileges: Arc<dyn PrivilegeCheck> =
        Arc::new(resolve_privileges(&client, credentials.as_ref()));
    let posts: Arc<dyn PostService> = Arc::new(data::ApiPostService::new(client.clone()));
    let comments: Arc<dyn CommentService> =
        Arc::new(data::ApiCommentService::new(client.clone()));
    let interactions: Arc<dyn InteractionService> =
        Arc::new(data::ApiInteractionService::new(client));

    Ok(Services {
        posts,
        comments,
        interactions,
        privileges,
        settings,
        navigation,
    })
}

/// Fetches the server's privilege table and the acting user's rank once, at
/// startup. Failures degrade to an anonymous user.
fn resolve_privileges(client: &api::Client, credentials: Option<&api::Credentials>) -> Privileges {
    let table = match client.info() {
        Ok(info) => info.config.privileges,
        Err(err) => {
            warn!(error = %err, "could not load server privileges");
            HashMap::new()
        }
    };

    let rank = match credentials {
        Some(credentials) => match client.user(&credentials.username) {
            Ok(user) => user.rank.parse::<Rank>().unwrap_or_else(|err| {
                warn!(%err, user = %user.name, "treating user as anonymous");
                Rank::Anonymous
            }),
            Err(err) => {
                warn!(error = %err, user = %credentials.username, "could not load user rank");
                Rank::Anonymous
            }
        },
        None => Rank::Anonymous,
    };
    info!(?rank, privileges = table.len(), "privileges resolved");
    Privileges::from_names(&table, rank)
}

fn offline_services(settings: settings::Handle, navigation: TopNavigation) -> Services {
    let samples = data::sample_posts();
    let posts = data::MockPostService::default();
    for (post, siblings) in &samples {
        posts.insert(post.clone(), *siblings);
    }
    let store = posts.store();

    Services {
        posts: Arc::new(posts),
        comments: Arc::new(data::MockCommentService::new().with_store(store.clone())),
        interactions: Arc::new(data::MockInteractionService::with_store(store)),
        privileges: Arc::new(AllowAll),
        settings,
        navigation,
    }
}

fn friendly_path(path: &std::path::Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            let mut display = String::from("~");
            if !stripped.as_os_str().is_empty() {
                display.push_str(&format!("/{}", stripped.display()));
            }
            return display;
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use crate::privileges::Capabilities;
    use crate::ui::TerminalViews;
    use crate::view::{CommentFormEvent, CommentListEvent, SidebarEvent};
    use std::time::Duration;

    #[test]
    fn offline_services_serve_sample_posts() {
        let services = offline_services(settings::Handle::default(), TopNavigation::new());
        assert_eq!(
            Capabilities::resolve(services.privileges.as_ref()),
            Capabilities {
                can_edit_posts: true,
                can_list_comments: true,
                can_create_comments: true,
            }
        );
        let mut controller = Controller::new(2, false, services, TerminalViews);
        settle(&mut controller);
        assert_eq!(controller.post().map(|post| post.id), Some(2));
    }

    fn settle(controller: &mut Controller<TerminalViews>) {
        for _ in 0..50 {
            if !controller.is_busy() {
                break;
            }
            controller.wait(Duration::from_millis(100));
        }
    }

    #[test]
    fn offline_changes_survive_leaving_the_post() {
        let services = offline_services(settings::Handle::default(), TopNavigation::new());
        let mut controller = Controller::new(2, false, services.clone(), TerminalViews);
        settle(&mut controller);
        controller
            .handle_event(SidebarEvent::Favorite { post: 2 }.into())
            .unwrap();
        controller
            .handle_event(
                CommentFormEvent::Submit {
                    text: "kept".into(),
                }
                .into(),
            )
            .unwrap();
        controller
            .handle_event(CommentListEvent::Delete { comment: 200 }.into())
            .unwrap();
        settle(&mut controller);
        drop(controller);

        let mut reopened = Controller::new(2, false, services, TerminalViews);
        settle(&mut reopened);
        let post = reopened.post().unwrap();
        assert!(post.own_favorite);
        assert_eq!(post.favorite_count, 1);
        let texts: Vec<&str> = post.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["kept"]);
        assert_eq!(post.comment_count, 1);
    }

    #[test]
    fn friendly_path_outside_home_is_unchanged() {
        assert_eq!(
            friendly_path(std::path::Path::new("/var/log/booru-view.log")),
            "/var/log/booru-view.log"
        );
    }
}
