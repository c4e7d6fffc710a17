use crate::{
    config::Config,
    guard::{self, Access, Route},
    issuer::{Credentials, IdentityIssuer},
    session::{Session, SessionManager},
    store::TokenStore,
    token::Role,
};
use anyhow::{anyhow, Result};
use regex::Regex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::rc::Rc;

pub type SharedSession = Rc<SessionManager<Box<dyn TokenStore>>>;

pub struct Context {
    pub config: Config,
    pub session: SharedSession,
    pub issuer: Box<dyn IdentityIssuer>,
}

/// Authenticate against the issuer and install the resulting token
pub fn login(ctx: &Context, email: &str, password: &str, role: &str) -> Result<Session> {
    if !is_email(email) {
        return Err(anyhow!("Invalid email address: {}", email));
    }
    let role = Role::parse(role)
        .ok_or_else(|| anyhow!("Invalid role: {}. Use: lecturer, student", role))?;

    let token = ctx
        .issuer
        .authenticate(&Credentials::new(email, password, role))?;
    install_token(ctx, &token)
}

/// Install a token obtained elsewhere
pub fn install_token(ctx: &Context, token: &str) -> Result<Session> {
    if ctx.session.login(token) {
        Ok(ctx.session.state())
    } else {
        Err(anyhow!("The server returned an invalid or expired token"))
    }
}

/// Prompt for a password without echoing it to the terminal
pub fn prompt_password() -> Result<String> {
    read_password_with(rpassword::read_password)
}

fn read_password_with(read: impl FnOnce() -> io::Result<String>) -> Result<String> {
    print!("password: ");
    io::stdout().flush()?;
    let password = read()?;
    if password.is_empty() {
        return Err(anyhow!("Password must not be empty"));
    }
    Ok(password)
}

pub fn print_status(session: &Session) {
    println!("Session: {}", session);
}

pub fn print_nav(session: &Session) {
    let entries = guard::nav_entries(session);
    if entries.is_empty() {
        println!("(loading)");
        return;
    }
    for route in entries {
        println!("  {}", route.path());
    }
}

pub fn describe_access(session: &Session, path: &str) -> Result<String> {
    let route = Route::from_path(path).ok_or_else(|| anyhow!("Unknown route: {}", path))?;
    let verdict = match guard::check(session, route) {
        Access::Pending => "pending (session is still loading)",
        Access::Allow => "allowed",
        Access::RedirectToLogin => "redirect to /login",
        Access::Forbidden => "forbidden for this role",
    };
    Ok(format!("{}: {}", route.path(), verdict))
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("unihub - type /help for commands, /exit to quit");
    print_status(&ctx.session.state());

    loop {
        match rl.readline(">>> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                match handle_command(&ctx, line) {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

/// Returns true when the REPL should exit
fn handle_command(ctx: &Context, cmd: &str) -> Result<bool> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    match parts[0] {
        "/exit" | "/quit" => return Ok(true),
        "/help" => {
            println!("Commands:");
            println!("  /exit                  - quit");
            println!("  /help                  - show commands");
            println!("  /status                - show the current session");
            println!("  /login <email> <role>  - log in (prompts for password)");
            println!("  /token <token>         - install a token directly");
            println!("  /logout                - log out");
            println!("  /nav                   - list navbar entries for this session");
            println!("  /check <route>         - check access to a route");
            println!("  /revalidate            - re-check token expiry now");
            println!("  /config                - show API and store settings");
        }
        "/config" => {
            println!("API: {}", ctx.config.base_url());
            println!(
                "Store: {} (tab {:?}, key {:?})",
                ctx.config.store_kind().as_str(),
                ctx.config.tab(),
                ctx.config.token_key()
            );
        }
        "/status" => print_status(&ctx.session.state()),
        "/login" => {
            let (email, role) = match parts.as_slice() {
                [_, email, role] => (*email, *role),
                _ => return Err(anyhow!("Usage: /login <email> <lecturer|student>")),
            };
            let password = prompt_password()?;
            let session = login(ctx, email, &password, role)?;
            print_status(&session);
        }
        "/token" => {
            let token = parts.get(1).ok_or_else(|| anyhow!("Usage: /token <token>"))?;
            let session = install_token(ctx, token)?;
            print_status(&session);
        }
        "/logout" => {
            ctx.session.logout();
            print_status(&ctx.session.state());
        }
        "/nav" => print_nav(&ctx.session.state()),
        "/check" => {
            let path = parts.get(1).ok_or_else(|| anyhow!("Usage: /check <route>"))?;
            println!("{}", describe_access(&ctx.session.state(), path)?);
        }
        "/revalidate" => {
            ctx.session.revalidate();
            print_status(&ctx.session.state());
        }
        other => println!("Unknown command: {} (try /help)", other),
    }
    Ok(false)
}

fn is_email(s: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(s.trim()))
        .unwrap_or(false)
}
