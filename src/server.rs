use std::io::Cursor;

use openssl::sha::sha256;
use rocket::http::{ContentType, Status};
use rocket::request::{self, FromRequest, Request};
use rocket::response::{self, content, Redirect, Responder, Response};
use rocket::Outcome;
use rocket_contrib::templates::handlebars::Handlebars;
use serde::Serialize;

use crate::auth::IdentityProvider;
use crate::directory::Directory;
use crate::error::PortalResult;
use crate::setup::LocalAdmin;
use crate::store::{FeedbackStore, MoodStore};

/// Collaborators shared by every request.
pub struct Portal {
    pub feedback: Box<dyn FeedbackStore>,
    pub moods: Box<dyn MoodStore>,
    pub directory: Box<dyn Directory>,
    pub identity: Option<Box<dyn IdentityProvider>>,
    pub local_admins: Vec<LocalAdmin>,
    pub session_ttl_hours: i64,
}

pub fn rocket(portal: Portal) -> rocket::Rocket {
    rocket::ignite()
        .manage(portal)
        .mount(
            "/api",
            routes![
                api::list_feedback,
                api::submit_feedback,
                api::get_feedback,
                api::update_feedback,
                api::delete_feedback,
                api::todays_mood,
                api::record_mood,
                api::get_mood,
                api::change_mood,
                api::delete_mood,
                api::moods_today,
                api::mood_analytics,
                api::feedback_analytics,
                api::directory,
                api::current_session,
                api::logout,
                api::local_login,
                api::start_login,
                api::posted_callback,
                api::query_callback,
            ],
        )
        .mount("/", routes![html::sign_in, html::staff_board, html::admin_board])
        .register(catchers![
            catchers::bad_request,
            catchers::not_found,
            catchers::unprocessable,
            catchers::internal_error
        ])
}

pub fn serve(portal: Portal) {
    // in debug builds this will force an init, good enough for testing
    let _hbars = &*TEMPLATES;

    let why = rocket(portal).launch();
    error!("Rocket failed to launch: {}", why);
}

//==============================================================================
// Conditional responses
//==============================================================================

/// The raw `If-None-Match` request header, if any.
pub struct IfNoneMatch(Option<String>);

impl IfNoneMatch {
    fn matches(&self, etag: &str) -> bool {
        match self.0 {
            Some(ref header) => header
                .split(',')
                .map(|tag| tag.trim())
                .any(|tag| tag == "*" || tag.trim_start_matches("W/") == etag),
            None => false,
        }
    }
}

impl<'a, 'r> FromRequest<'a, 'r> for IfNoneMatch {
    type Error = ();

    fn from_request(request: &'a Request<'r>) -> request::Outcome<IfNoneMatch, ()> {
        let header = request.headers().get_one("If-None-Match").map(|h| h.to_string());
        Outcome::Success(IfNoneMatch(header))
    }
}

/// A JSON body carrying a strong ETag, or 304 when the client already has it.
pub enum Tagged {
    NotModified(String),
    Fresh { etag: String, body: String },
}

impl Tagged {
    pub fn json<T: Serialize>(value: &T, if_none_match: &IfNoneMatch) -> PortalResult<Tagged> {
        let body = serde_json::to_string(value)?;
        let etag = format!("\"{}\"", hex::encode(sha256(body.as_bytes())));

        if if_none_match.matches(&etag) {
            Ok(Tagged::NotModified(etag))
        } else {
            Ok(Tagged::Fresh { etag, body })
        }
    }
}

impl<'r> Responder<'r> for Tagged {
    fn respond_to(self, _: &Request<'_>) -> response::Result<'r> {
        match self {
            Tagged::NotModified(etag) => Response::build()
                .status(Status::NotModified)
                .raw_header("ETag", etag)
                .ok(),
            Tagged::Fresh { etag, body } => Response::build()
                .header(ContentType::JSON)
                .raw_header("ETag", etag)
                .sized_body(Cursor::new(body))
                .ok(),
        }
    }
}

//==============================================================================
// Pages
//==============================================================================

pub enum Page {
    Render(content::Html<String>),
    Away(Redirect),
}

impl<'r> Responder<'r> for Page {
    fn respond_to(self, req: &Request<'_>) -> response::Result<'r> {
        match self {
            Page::Render(html) => html.respond_to(req),
            Page::Away(redirect) => redirect.respond_to(req),
        }
    }
}

mod html {
    use chrono::{Duration, Utc};
    use rocket::response::{content, Redirect};
    use rocket::State;

    use super::{Page, Portal, TEMPLATES};
    use crate::analytics::feedback_stats;
    use crate::error::PortalResult;
    use crate::feedback::list_feedback;
    use crate::moods::{mood_report, todays_mood};
    use crate::session::Session;
    use crate::setup::SETUP;

    const BOARD_MOOD_DAYS: u32 = 7;

    fn render(name: &str, model: serde_json::Value) -> PortalResult<Page> {
        let rendered = TEMPLATES.render(name, &json!({ "model": model }))?;
        Ok(Page::Render(content::Html(rendered)))
    }

    #[get("/?<error>")]
    pub fn sign_in(
        portal: State<'_, Portal>,
        session: Option<Session>,
        error: Option<String>,
    ) -> PortalResult<Page> {
        render(
            "signin",
            json!({
                "error": error,
                "session": session,
                "sso": portal.identity.is_some(),
            }),
        )
    }

    #[get("/feedback")]
    pub fn staff_board(portal: State<'_, Portal>, session: Option<Session>) -> PortalResult<Page> {
        let session = match session {
            Some(session) => session,
            None => return Ok(Page::Away(Redirect::to("/"))),
        };
        let now = Utc::now();

        let feedback = list_feedback(&*portal.feedback, None, now)?;
        let mood = todays_mood(&*portal.moods, &session, now)?;

        render(
            "feedback",
            json!({
                "session": session,
                "departments": SETUP.departments().collect::<Vec<_>>(),
                "feedback": feedback,
                "todaysMood": mood,
            }),
        )
    }

    #[get("/admin/feedback")]
    pub fn admin_board(portal: State<'_, Portal>, session: Option<Session>) -> PortalResult<Page> {
        let session = match session {
            Some(session) => session,
            None => return Ok(Page::Away(Redirect::to("/"))),
        };
        if !session.is_admin() {
            return Ok(Page::Away(Redirect::to("/feedback")));
        }
        let now = Utc::now();

        let feedback = list_feedback(&*portal.feedback, None, now)?;
        let stats = feedback_stats(&feedback, now);
        let report = mood_report(&*portal.moods, Some(BOARD_MOOD_DAYS), now)?;

        render(
            "admin",
            json!({
                "session": session,
                "feedback": feedback,
                "stats": stats,
                "moods": report,
                "ranking": report.ranked(),
                "moodSince": (now - Duration::days(i64::from(BOARD_MOOD_DAYS))).to_rfc3339(),
            }),
        )
    }
}

mod api {
    use chrono::{DateTime, TimeZone, Utc};
    use rocket::http::{Cookie, Cookies, SameSite, Status};
    use rocket::request::LenientForm;
    use rocket::response::{status, Redirect};
    use rocket::State;
    use rocket_contrib::json::Json;
    use serde_json::Value;

    use super::{IfNoneMatch, Portal, Tagged};
    use crate::analytics::{feedback_stats, DepartmentMood, MoodReport};
    use crate::auth::{self, random_token, Callback, Pending, SignIn};
    use crate::config::{AUTH_COOKIE_MINUTES, NONCE_COOKIE, STATE_COOKIE};
    use crate::directory::DirectoryPage;
    use crate::domain::feedback::{FeedbackRecord, FeedbackStatus};
    use crate::error::{PortalError, PortalResult};
    use crate::feedback::{self, FeedbackSubmission};
    use crate::moods::{self, MoodChange, MoodSubmission};
    use crate::session::{require, require_admin, Session};
    use crate::setup::SETUP;
    use crate::updates::FeedbackUpdate;

    const DEFAULT_DIRECTORY_PAGE: usize = 25;

    //--------------------------------------------------------------------------
    // feedback

    #[get("/feedback?<status>")]
    pub fn list_feedback(
        portal: State<'_, Portal>,
        session: Option<Session>,
        status: Option<String>,
        if_none_match: IfNoneMatch,
    ) -> PortalResult<Tagged> {
        require(session)?;

        let status = match status {
            Some(s) => Some(s.parse::<FeedbackStatus>().map_err(|_| {
                PortalError::Validation(vec![format!("unknown status filter {:?}", s)])
            })?),
            None => None,
        };

        let records = feedback::list_feedback(&*portal.feedback, status, Utc::now())?;
        Tagged::json(&records, &if_none_match)
    }

    #[post("/feedback", format = "json", data = "<submission>")]
    pub fn submit_feedback(
        portal: State<'_, Portal>,
        session: Option<Session>,
        submission: Json<FeedbackSubmission>,
    ) -> PortalResult<status::Custom<Json<FeedbackRecord>>> {
        let session = require(session)?;
        let record = feedback::submit_feedback(
            &*portal.feedback,
            &session,
            submission.into_inner(),
            Utc::now(),
        )?;
        Ok(status::Custom(Status::Created, Json(record)))
    }

    #[get("/feedback/<id>")]
    pub fn get_feedback(
        portal: State<'_, Portal>,
        session: Option<Session>,
        id: i32,
    ) -> PortalResult<Json<FeedbackRecord>> {
        require(session)?;
        Ok(Json(feedback::get_feedback(&*portal.feedback, id, Utc::now())?))
    }

    #[put("/feedback/<id>", format = "json", data = "<update>")]
    pub fn update_feedback(
        portal: State<'_, Portal>,
        session: Option<Session>,
        id: i32,
        update: Json<FeedbackUpdate>,
    ) -> PortalResult<Json<FeedbackRecord>> {
        let session = require(session)?;
        let record = feedback::update_feedback(
            &*portal.feedback,
            &*portal.directory,
            &session,
            id,
            update.into_inner(),
            Utc::now(),
        )?;
        Ok(Json(record))
    }

    #[delete("/feedback/<id>")]
    pub fn delete_feedback(
        portal: State<'_, Portal>,
        session: Option<Session>,
        id: i32,
    ) -> PortalResult<Json<Value>> {
        let session = require_admin(session)?;
        feedback::delete_feedback(&*portal.feedback, &session, id)?;
        Ok(Json(json!({ "message": "Feedback deleted successfully" })))
    }

    //--------------------------------------------------------------------------
    // moods

    #[get("/mood")]
    pub fn todays_mood(portal: State<'_, Portal>, session: Option<Session>) -> PortalResult<Json<Value>> {
        let session = require(session)?;
        let mood = moods::todays_mood(&*portal.moods, &session, Utc::now())?;
        Ok(Json(json!({ "mood": mood })))
    }

    #[post("/mood", format = "json", data = "<submission>")]
    pub fn record_mood(
        portal: State<'_, Portal>,
        session: Option<Session>,
        submission: Json<MoodSubmission>,
    ) -> PortalResult<status::Custom<Json<Value>>> {
        let session = require(session)?;
        let entry = moods::record_mood(&*portal.moods, &session, submission.into_inner(), Utc::now())?;
        Ok(status::Custom(
            Status::Created,
            Json(json!({ "message": "Mood saved successfully", "mood": entry })),
        ))
    }

    #[get("/mood/<id>")]
    pub fn get_mood(portal: State<'_, Portal>, session: Option<Session>, id: i32) -> PortalResult<Json<Value>> {
        require(session)?;
        let entry = moods::get_mood(&*portal.moods, id)?;
        Ok(Json(json!({ "mood": entry })))
    }

    #[put("/mood/<id>", format = "json", data = "<change>")]
    pub fn change_mood(
        portal: State<'_, Portal>,
        session: Option<Session>,
        id: i32,
        change: Json<MoodChange>,
    ) -> PortalResult<Json<Value>> {
        let session = require(session)?;
        let entry = moods::change_mood(&*portal.moods, &session, id, change.into_inner())?;
        Ok(Json(json!({ "message": "Mood updated successfully", "mood": entry })))
    }

    #[delete("/mood/<id>")]
    pub fn delete_mood(portal: State<'_, Portal>, session: Option<Session>, id: i32) -> PortalResult<Json<Value>> {
        let session = require(session)?;
        moods::delete_mood(&*portal.moods, &session, id)?;
        Ok(Json(json!({ "message": "Mood deleted successfully" })))
    }

    #[get("/moods/today")]
    pub fn moods_today(portal: State<'_, Portal>, session: Option<Session>) -> PortalResult<Json<Value>> {
        require(session)?;
        let entries = moods::moods_today(&*portal.moods, Utc::now())?;
        Ok(Json(json!(entries)))
    }

    //--------------------------------------------------------------------------
    // analytics and directory

    #[derive(Serialize)]
    struct MoodAnalytics<'a> {
        #[serde(flatten)]
        report: &'a MoodReport,
        ranking: Vec<&'a DepartmentMood>,
        highest: Option<&'a DepartmentMood>,
        lowest: Option<&'a DepartmentMood>,
    }

    #[get("/analytics/moods?<days>")]
    pub fn mood_analytics(
        portal: State<'_, Portal>,
        session: Option<Session>,
        days: Option<u32>,
    ) -> PortalResult<Json<Value>> {
        require_admin(session)?;
        let report = moods::mood_report(&*portal.moods, days, Utc::now())?;

        let view = MoodAnalytics {
            report: &report,
            ranking: report.ranked(),
            highest: report.highest(),
            lowest: report.lowest(),
        };
        Ok(Json(serde_json::to_value(&view)?))
    }

    #[get("/analytics/feedback")]
    pub fn feedback_analytics(portal: State<'_, Portal>, session: Option<Session>) -> PortalResult<Json<Value>> {
        require_admin(session)?;
        let now = Utc::now();
        let records = feedback::list_feedback(&*portal.feedback, None, now)?;
        Ok(Json(serde_json::to_value(feedback_stats(&records, now))?))
    }

    #[get("/directory?<cursor>&<limit>")]
    pub fn directory(
        portal: State<'_, Portal>,
        session: Option<Session>,
        cursor: Option<String>,
        limit: Option<usize>,
    ) -> PortalResult<Json<DirectoryPage>> {
        require_admin(session)?;
        let page = portal.directory.list(
            cursor.as_ref().map(|c| c.as_str()),
            limit.unwrap_or(DEFAULT_DIRECTORY_PAGE),
        )?;
        Ok(Json(page))
    }

    //--------------------------------------------------------------------------
    // sessions

    #[get("/session")]
    pub fn current_session(session: Option<Session>) -> Json<Value> {
        match session {
            Some(session) => Json(json!({ "isLoggedIn": true, "session": session })),
            None => Json(json!({ "isLoggedIn": false })),
        }
    }

    #[post("/logout")]
    pub fn logout(mut cookies: Cookies<'_>) -> Json<Value> {
        Session::destroy(&mut cookies);
        Json(json!({ "message": "Logged out" }))
    }

    #[derive(Deserialize)]
    pub struct Credentials {
        username: String,
        password: String,
    }

    #[post("/login", format = "json", data = "<credentials>")]
    pub fn local_login(
        portal: State<'_, Portal>,
        mut cookies: Cookies<'_>,
        credentials: Json<Credentials>,
    ) -> PortalResult<Json<Session>> {
        let session = auth::local_login(
            &portal.local_admins,
            &credentials.username,
            &credentials.password,
            Utc::now(),
            portal.session_ttl_hours,
        )?;
        session.save(&mut cookies)?;
        Ok(Json(session))
    }

    //--------------------------------------------------------------------------
    // single sign-on

    fn remember(cookies: &mut Cookies<'_>, name: &'static str, token: &str, now: DateTime<Utc>) {
        // the provider posts back cross-site, so these can't be SameSite=Lax
        let cookie = Cookie::build(name, format!("{}.{}", token, now.timestamp()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::None)
            .secure(!cfg!(debug_assertions))
            .finish();
        cookies.add_private(cookie);
    }

    /// Take a value stored by `remember`, if it's still fresh.
    fn recall(cookies: &mut Cookies<'_>, name: &'static str, now: DateTime<Utc>) -> Option<String> {
        let cookie = cookies.get_private(name)?;
        cookies.remove_private(Cookie::named(name));

        let mut parts = cookie.value().rsplitn(2, '.');
        let issued = parts.next()?.parse::<i64>().ok()?;
        let token = parts.next()?;

        let issued = Utc.timestamp_opt(issued, 0).single()?;
        if now - issued > chrono::Duration::minutes(AUTH_COOKIE_MINUTES) {
            debug!("{} cookie expired", name);
            return None;
        }
        Some(token.to_string())
    }

    #[get("/auth/login")]
    pub fn start_login(portal: State<'_, Portal>, mut cookies: Cookies<'_>) -> Redirect {
        let provider = match portal.identity {
            Some(ref provider) => provider,
            None => {
                warn!("sign-in attempted without single sign-on configured");
                return Redirect::to("/?error=missing_client_id");
            }
        };

        let url = random_token().and_then(|state| {
            let nonce = random_token()?;
            let url = provider.authorize_url(&state, &nonce)?;
            Ok((state, nonce, url))
        });

        match url {
            Ok((state, nonce, url)) => {
                let now = Utc::now();
                remember(&mut cookies, STATE_COOKIE, &state, now);
                remember(&mut cookies, NONCE_COOKIE, &nonce, now);
                Redirect::to(url)
            }
            Err(why) => {
                error!("couldn't start sign-in: {}", why);
                Redirect::to("/?error=login_init_failed")
            }
        }
    }

    #[derive(Debug, FromForm)]
    pub struct CallbackForm {
        code: Option<String>,
        state: Option<String>,
        error: Option<String>,
        error_description: Option<String>,
    }

    impl From<CallbackForm> for Callback {
        fn from(form: CallbackForm) -> Self {
            Callback {
                code: form.code,
                state: form.state,
                error: form.error,
                error_description: form.error_description,
            }
        }
    }

    fn finish_login(portal: &Portal, cookies: &mut Cookies<'_>, callback: Callback) -> Redirect {
        let now = Utc::now();
        let pending = Pending {
            state: recall(cookies, STATE_COOKIE, now),
            nonce: recall(cookies, NONCE_COOKIE, now),
        };

        let sign_in = SignIn {
            provider: portal.identity.as_ref().map(|p| p.as_ref()),
            directory: &*portal.directory,
            setup: &SETUP,
            session_ttl_hours: portal.session_ttl_hours,
        };

        let session = match sign_in.complete(callback, pending, now) {
            Ok(session) => session,
            Err(failure) => {
                warn!("sign-in failed: {}", failure);
                return Redirect::to(format!("/?error={}", failure.code()));
            }
        };

        if let Err(why) = session.save(cookies) {
            error!("couldn't save session for {}: {}", session.id, why);
            return Redirect::to("/?error=session_failed");
        }

        if session.is_admin() {
            Redirect::to("/admin/feedback")
        } else {
            Redirect::to("/feedback")
        }
    }

    #[post("/auth/callback", data = "<form>")]
    pub fn posted_callback(
        portal: State<'_, Portal>,
        mut cookies: Cookies<'_>,
        form: LenientForm<CallbackForm>,
    ) -> Redirect {
        finish_login(&portal, &mut cookies, form.into_inner().into())
    }

    #[get("/auth/callback?<form..>")]
    pub fn query_callback(
        portal: State<'_, Portal>,
        mut cookies: Cookies<'_>,
        form: LenientForm<CallbackForm>,
    ) -> Redirect {
        finish_login(&portal, &mut cookies, form.into_inner().into())
    }
}

mod catchers {
    use rocket::request::Request;
    use rocket_contrib::json::Json;
    use serde_json::Value;

    #[catch(400)]
    pub fn bad_request() -> Json<Value> {
        Json(json!({ "error": "malformed request" }))
    }

    #[catch(404)]
    pub fn not_found(req: &Request<'_>) -> Json<Value> {
        Json(json!({ "error": format!("nothing found at {}", req.uri()) }))
    }

    #[catch(422)]
    pub fn unprocessable() -> Json<Value> {
        Json(json!({ "error": "request body doesn't match any accepted shape" }))
    }

    #[catch(500)]
    pub fn internal_error() -> Json<Value> {
        Json(json!({ "error": "Internal Server Error" }))
    }
}

lazy_static! {
    static ref TEMPLATES: Handlebars = {
        let mut hbars = Handlebars::new();
        let root_template = include_str!("templates/index.html");

        let pages = [
            ("signin", include_str!("templates/signin.hbs")),
            ("feedback", include_str!("templates/feedback.hbs")),
            ("admin", include_str!("templates/admin.hbs")),
        ];

        for &(name, fragment) in pages.iter() {
            let template = root_template.replace("{{content}}", fragment);
            hbars
                .register_template_string(name, &template)
                .expect("unable to register page template");
        }

        hbars
    };
}
