//! Show a profile document, optionally merged with its phonebook entry.

use std::fmt::Write;

use tracing::debug;
use tunnelward_api::{FilePhonebook, PhonebookScope, PhonebookStore};
use tunnelward_core::Profile;

use crate::cli::{GlobalOpts, ShowArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn list(values: &[String]) -> String {
    if values.is_empty() {
        "-".into()
    } else {
        values.join(", ")
    }
}

fn optional(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn detail(p: &Profile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name:            {}", p.name);
    let _ = writeln!(out, "Source:          {}", p.source);
    let _ = writeln!(out, "Servers:         {}", list(&p.servers));
    let _ = writeln!(out, "Protocol:        {}", p.native_protocol);
    let _ = writeln!(out, "Routing:         {}", p.routing_policy);
    let auth = p.auth_method.map(|a| a.to_string());
    let _ = writeln!(out, "Auth:            {}", optional(auth.as_deref()));
    let _ = writeln!(out, "Always on:       {}", util::yes_no(p.always_on));
    let _ = writeln!(out, "Device tunnel:   {}", util::yes_no(p.device_tunnel));
    let _ = writeln!(out, "Register DNS:    {}", util::yes_no(p.register_dns));
    let _ = writeln!(out, "DNS suffixes:    {}", list(&p.dns_suffixes));
    let _ = writeln!(out, "Trusted nets:    {}", list(&p.trusted_networks));
    let _ = writeln!(out, "Proxy PAC:       {}", optional(p.proxy_pac_url.as_deref()));
    let _ = writeln!(out, "Proxy server:    {}", optional(p.proxy_server.as_deref()));

    let _ = writeln!(out, "Routes:          {}", p.routes.len());
    for route in &p.routes {
        let _ = writeln!(out, "  {route}");
    }
    let _ = writeln!(out, "Traffic filters: {}", p.traffic_filters.len());
    for filter in &p.traffic_filters {
        let _ = writeln!(out, "  {filter}");
    }
    let _ = writeln!(
        out,
        "Name rules:      {}",
        p.domain_name_information.len()
    );
    for rule in &p.domain_name_information {
        let _ = writeln!(out, "  {rule}");
    }
    out.trim_end().to_owned()
}

pub fn handle(args: &ShowArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let xml = util::read_file(&args.document)?;
    let name = args.name.clone().unwrap_or_else(|| {
        args.document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let profile = match &args.phonebook {
        Some(path) => {
            let scope = if args.all_users {
                PhonebookScope::AllUsers
            } else {
                PhonebookScope::CurrentUser
            };
            // One file serves both scopes; the flag only picks the lookup.
            let phonebook = FilePhonebook::new(path, path);
            let section = phonebook.read_section(scope, &name)?;
            debug!(profile = %name, found = section.is_some(), "phonebook lookup");
            Profile::from_bridge_and_phonebook(&name, &xml, section.as_ref())
        }
        None => Profile::from_document(&name, &xml),
    };

    if !profile.load_error.is_empty() && !global.quiet {
        eprintln!("warning: {}: {}", profile.name, profile.load_error);
    }

    let out = output::render_single(&global.output, &profile, detail, |p| p.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
