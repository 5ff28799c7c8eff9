use colored::Colorize;

/// Display the sqleech banner (for help/main command only).
pub fn display_banner() {
    let banner = r#"
           _           _
 ___  __ _| | ___  ___| |_
/ __|/ _` | |/ _ \/ _ \ __|
\__ \ (_| | |  __/  __/ |_
|___/\__, |_|\___|\___|\__|
        |_|
    "#;

    println!("{}", banner.truecolor(255, 140, 0));
    println!("{}", "  sqleech – automated SQL injection detection".bright_yellow());
    println!(
        "{}",
        "  Discovers injectable parameters, fingerprints the DBMS, reports findings.".bright_black()
    );
    println!();
    println!(
        "{}",
        "  Authorized use only. Ensure you have permission before testing any target.".yellow()
    );
    println!();
}
