//! Routes and handlers of the grades bot.
//!
//! Conversation:
//!
//! ```text
//! /start ──▶ awaiting_login ──(login)──▶ awaiting_password ──(password)──▶ logged in
//!                   ▲                              │
//!                   └──────── wrong password ──────┘
//! ```
//!
//! Once logged in, `/grades`, the `Grades` keyboard button or the
//! `/grades` callback list semesters, and `/grades/semester/:semester_id`
//! callbacks show one of them.

use std::sync::Arc;
use std::time::Duration;

use brass::core::UserId;
use brass::framework::{
    BoxError, Context, ExtractError, ExtractResult, FromContext, Middleware, Next, Param, Router,
    Routes, Text, from_fn, recover, trace,
};
use brass::transport::CallError;
use tokio::sync::mpsc;
use tracing::warn;

use crate::portal::{Credentials, Portal, Semester, grades_request};

pub const AWAITING_LOGIN: &str = "awaiting_login";
pub const AWAITING_PASSWORD: &str = "awaiting_password";

const PENDING_LOGIN: &str = "pending_login";
const CREDENTIALS: &str = "credentials";
const CACHE_TTL: Duration = Duration::from_secs(600);

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub user: UserId,
    pub text: String,
}

/// What handlers use to reach the outside world.
#[derive(Clone)]
pub struct Bot {
    portal: Portal,
    outbox: mpsc::UnboundedSender<Reply>,
}

impl Bot {
    pub fn new(portal: Portal, outbox: mpsc::UnboundedSender<Reply>) -> Self {
        Self { portal, outbox }
    }

    fn say(&self, user: UserId, text: impl Into<String>) {
        let reply = Reply {
            user,
            text: text.into(),
        };
        if self.outbox.send(reply).is_err() {
            warn!(%user, "Outbox closed, reply dropped");
        }
    }
}

impl FromContext for Bot {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        ctx.get::<Bot>().ok_or(ExtractError::MissingExtension("Bot"))
    }
}

impl FromContext for Credentials {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        ctx.get::<Credentials>()
            .ok_or(ExtractError::MissingExtension("Credentials"))
    }
}

fn cache_key(user: UserId) -> String {
    format!("grades:{user}")
}

/// Makes `bot` available to every handler.
fn provide(bot: Bot) -> Middleware {
    from_fn(move |ctx: Arc<Context>, next: Next| {
        let bot = bot.clone();
        async move {
            ctx.insert(bot);
            next.run(ctx).await
        }
    })
}

/// Lets the event through only for users with saved credentials.
fn require_login() -> Middleware {
    from_fn(|ctx: Arc<Context>, next: Next| async move {
        match ctx.data::<Credentials>(CREDENTIALS).await {
            Ok(creds) => {
                ctx.insert(creds);
                next.run(ctx).await
            }
            Err(e) if e.is_not_found() => {
                Bot::from_context(&ctx)?.say(ctx.user_id(), "Please /start and log in first.");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    })
}

pub fn router(bot: Bot) -> Router {
    let mut router = Router::new();
    router
        .use_middleware(trace())
        .use_middleware(recover())
        .use_middleware(provide(bot));

    router
        .command("start", start)
        .command("help", help)
        .state(AWAITING_LOGIN, receive_login)
        .state(AWAITING_PASSWORD, receive_password);

    router
        .group([require_login()])
        .command("grades", grades)
        .message("Grades", grades)
        .callback("/grades", grades)
        .callback_tree("/grades/semester/:semester_id", semester)
        .callback("/logout", logout);

    router
}

async fn start(ctx: Arc<Context>, bot: Bot) -> Result<(), BoxError> {
    ctx.set_state(AWAITING_LOGIN).await?;
    bot.say(ctx.user_id(), "Welcome! Send your portal login.");
    Ok(())
}

async fn help(user: UserId, bot: Bot) {
    bot.say(
        user,
        "/start - log in\n/grades - your semesters\ncb:/logout - forget me",
    );
}

async fn receive_login(ctx: Arc<Context>, bot: Bot, Text(login): Text) -> Result<(), BoxError> {
    let login = login.trim();
    if login.is_empty() || login.contains(char::is_whitespace) {
        bot.say(ctx.user_id(), "That does not look like a login, try again.");
        return Ok(());
    }

    ctx.set_data(PENDING_LOGIN, login).await?;
    ctx.set_state(AWAITING_PASSWORD).await?;
    bot.say(ctx.user_id(), "Now send your password.");
    Ok(())
}

async fn receive_password(
    ctx: Arc<Context>,
    bot: Bot,
    Text(password): Text,
) -> Result<(), BoxError> {
    let user = ctx.user_id();
    let creds = Credentials {
        login: ctx.data(PENDING_LOGIN).await?,
        password,
    };

    match bot.portal.call_uncancellable(&grades_request(&creds)?).await {
        Ok(resp) if resp.is_success() => {
            let semesters: Vec<Semester> = resp.json()?;
            ctx.set_data(CREDENTIALS, &creds).await?;
            ctx.delete_data(&[PENDING_LOGIN]).await?;
            ctx.set_temp_data(&cache_key(user), &semesters, CACHE_TTL)
                .await?;
            ctx.clear_state().await?;
            bot.say(
                user,
                format!(
                    "Logged in as {}. Send \"Grades\" or tap [cb:/grades].",
                    creds.login
                ),
            );
        }
        Ok(resp) => bot.say(user, format!("The portal refused: {}", resp.text())),
        Err(CallError::Forbidden) => {
            ctx.set_state(AWAITING_LOGIN).await?;
            bot.say(user, "Wrong login or password. Send your login again.");
        }
        Err(e) if e.is_transient() => bot.say(
            user,
            "The portal is not answering, send your password again in a minute.",
        ),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Returns the user's semesters from the cache or the portal.
///
/// `None` means the user has already been told why there is nothing to show.
async fn load_semesters(
    ctx: &Context,
    bot: &Bot,
    creds: &Credentials,
) -> Result<Option<Vec<Semester>>, BoxError> {
    let user = ctx.user_id();
    let key = cache_key(user);

    match ctx.temp_data::<Vec<Semester>>(&key).await {
        Ok(semesters) => return Ok(Some(semesters)),
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!(%user, error = %e, "Ignoring unreadable grade cache"),
    }

    match bot.portal.call_uncancellable(&grades_request(creds)?).await {
        Ok(resp) if resp.is_success() => {
            let semesters: Vec<Semester> = resp.json()?;
            ctx.set_temp_data(&key, &semesters, CACHE_TTL).await?;
            Ok(Some(semesters))
        }
        Ok(resp) => {
            bot.say(user, format!("The portal refused: {}", resp.text()));
            Ok(None)
        }
        Err(CallError::Forbidden) => {
            ctx.clear_user().await?;
            bot.say(user, "Your password no longer works, please /start again.");
            Ok(None)
        }
        Err(e) if e.is_transient() => {
            bot.say(user, "The portal is not answering, try again in a minute.");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn grades(ctx: Arc<Context>, bot: Bot, creds: Credentials) -> Result<(), BoxError> {
    let Some(semesters) = load_semesters(&ctx, &bot, &creds).await? else {
        return Ok(());
    };

    let mut text = String::from("Your semesters:");
    for semester in &semesters {
        text.push_str(&format!(
            "\n  {} [cb:/grades/semester/{}]",
            semester.name, semester.id
        ));
    }
    bot.say(ctx.user_id(), text);
    Ok(())
}

async fn semester(
    ctx: Arc<Context>,
    bot: Bot,
    creds: Credentials,
    Param(id): Param<u32>,
) -> Result<(), BoxError> {
    let Some(semesters) = load_semesters(&ctx, &bot, &creds).await? else {
        return Ok(());
    };

    let Some(semester) = semesters.iter().find(|s| s.id == id) else {
        bot.say(ctx.user_id(), format!("There is no semester {id}."));
        return Ok(());
    };

    let mut text = semester.name.clone();
    for course in &semester.courses {
        text.push_str(&format!("\n  {:<24} {}", course.name, course.grade));
    }
    bot.say(ctx.user_id(), text);
    Ok(())
}

async fn logout(ctx: Arc<Context>, bot: Bot) -> Result<(), BoxError> {
    ctx.clear_user().await?;
    ctx.delete_temp_data(&cache_key(ctx.user_id())).await?;
    bot.say(ctx.user_id(), "Forgotten. Bye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use brass::core::{BoxedStore, Event, MemoryStore, Store};
    use brass::framework::Dispatcher;
    use brass::transport::{RetryPolicy, RetryTransport};

    use crate::portal::FakePortal;

    struct Harness {
        dispatcher: Dispatcher,
        store: BoxedStore,
        replies: mpsc::UnboundedReceiver<Reply>,
    }

    impl Harness {
        fn new() -> Self {
            let portal = Arc::new(RetryTransport::new(
                FakePortal::new(),
                RetryPolicy::new(3, Duration::from_millis(500)),
            ));
            let (tx, replies) = mpsc::unbounded_channel();
            let store: BoxedStore = Arc::new(MemoryStore::new());
            let table = router(Bot::new(portal, tx)).build().unwrap();
            Self {
                dispatcher: Dispatcher::new(table, store.clone()),
                store,
                replies,
            }
        }

        async fn send(&mut self, event: Event) -> String {
            assert!(self.dispatcher.dispatch(event).await.is_handled());
            self.replies.try_recv().map(|r| r.text).unwrap_or_default()
        }

        async fn state(&self, user: i64) -> Option<String> {
            self.store.get_state(UserId(user)).await.ok()
        }
    }

    async fn log_in(h: &mut Harness, user: i64, login: &str) -> String {
        h.send(Event::command(user, "/start")).await;
        h.send(Event::message(user, login)).await;
        h.send(Event::message(user, "hunter2")).await
    }

    #[tokio::test]
    async fn test_login_then_browse_grades() {
        let mut h = Harness::new();

        assert!(h.send(Event::command(1, "/start")).await.contains("login"));
        assert_eq!(h.state(1).await.as_deref(), Some(AWAITING_LOGIN));

        assert!(h.send(Event::message(1, "alice")).await.contains("password"));
        assert_eq!(h.state(1).await.as_deref(), Some(AWAITING_PASSWORD));

        assert!(h.send(Event::message(1, "hunter2")).await.contains("Logged in as alice"));
        assert_eq!(h.state(1).await, None);

        let list = h.send(Event::message(1, "Grades")).await;
        assert!(list.contains("[cb:/grades/semester/2]"));

        let detail = h.send(Event::callback(1, "/grades/semester/2")).await;
        assert!(detail.starts_with("Spring 2026"));
        assert!(detail.contains("Compilers"));

        let missing = h.send(Event::callback(1, "/grades/semester/9")).await;
        assert_eq!(missing, "There is no semester 9.");

        h.send(Event::callback(1, "/logout")).await;
        let creds = h.store.get_data(UserId(1), CREDENTIALS).await;
        assert!(creds.unwrap_err().is_not_found());
        assert!(h.send(Event::message(1, "Grades")).await.contains("log in first"));
    }

    #[tokio::test]
    async fn test_wrong_password_restarts_login() {
        let mut h = Harness::new();
        h.send(Event::command(2, "/start")).await;
        h.send(Event::message(2, "bob")).await;

        let reply = h.send(Event::message(2, "letmein")).await;
        assert!(reply.starts_with("Wrong login or password"));
        assert_eq!(h.state(2).await.as_deref(), Some(AWAITING_LOGIN));
    }

    #[tokio::test]
    async fn test_grades_require_login() {
        let mut h = Harness::new();
        let reply = h.send(Event::callback(3, "/grades")).await;
        assert_eq!(reply, "Please /start and log in first.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_portal_is_retried() {
        let mut h = Harness::new();
        let reply = log_in(&mut h, 4, "flaky_carol").await;
        assert!(reply.contains("Logged in as flaky_carol"));
    }

    #[tokio::test]
    async fn test_unavailable_portal_keeps_waiting_for_password() {
        let mut h = Harness::new();
        let reply = log_in(&mut h, 5, "down").await;
        assert!(reply.contains("not answering"));
        assert_eq!(h.state(5).await.as_deref(), Some(AWAITING_PASSWORD));
    }
}
