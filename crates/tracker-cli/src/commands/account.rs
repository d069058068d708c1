//! Account command handlers

use anyhow::{Context, Result};

use tracker_core::sync::TrackerClient;
use tracker_core::Tracker;

use crate::output::Output;
use crate::prompt::{ask, ask_password};

/// Username and password, prompting for whichever was not passed
fn credentials(username: Option<String>, password: Option<String>) -> Result<(String, String)> {
    let username = match username {
        Some(name) => name,
        None => ask("Username")?,
    };
    let password = match password {
        Some(password) => password,
        None => ask_password("Password")?,
    };
    Ok((username, password))
}

fn check_transport(tracker: &Tracker, output: &Output) {
    if !tracker.remote().is_secure_transport() {
        output.warn(&format!(
            "{} is not https; credentials will be refused",
            tracker.remote().base_url()
        ));
    }
}

pub async fn login(
    tracker: &Tracker,
    client: &TrackerClient,
    username: Option<String>,
    password: Option<String>,
    output: &Output,
) -> Result<()> {
    check_transport(tracker, output);
    let (username, password) = credentials(username, password)?;

    let user = client
        .login(&username, &password)
        .await?
        .context("Login failed")?;
    output.print_user(&user, "Logged in")
}

pub async fn signup(
    tracker: &Tracker,
    client: &TrackerClient,
    username: Option<String>,
    password: Option<String>,
    output: &Output,
) -> Result<()> {
    check_transport(tracker, output);
    let (username, password) = credentials(username, password)?;

    let user = client
        .signup(&username, &password)
        .await?
        .context("Signup failed")?;
    output.print_user(&user, "Account created, logged in")
}

/// Log out locally; the server call is best effort
pub async fn logout(client: &TrackerClient, output: &Output) -> Result<()> {
    client.logout().await?;
    output.success("Logged out");
    Ok(())
}
