use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ScheduleFormat {
    Cron,
    Systemd,
    Launchd,
}

/// Emit a periodic-run definition for a project (spec.md §6 "project
/// schedule"). This never installs anything. By default it prints a
/// one-line summary; pass `--show` to print the full unit so the operator
/// can review it before wiring it into their own scheduler.
pub fn run(path: &Path, format: ScheduleFormat, show: bool) -> Result<i32> {
    let project_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let trident_bin = std::env::current_exe().unwrap_or_else(|_| "trident".into());
    let name = project_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("trident-project")
        .to_string();

    let rendered = match format {
        ScheduleFormat::Cron => format!(
            "# run every hour\n0 * * * * {} project run {}\n",
            trident_bin.display(),
            project_path.display()
        ),
        ScheduleFormat::Systemd => format!(
            "[Unit]\nDescription=Trident workflow: {name}\n\n\
             [Timer]\nOnCalendar=hourly\nPersistent=true\n\n\
             [Install]\nWantedBy=timers.target\n\n\
             # pair with a matching {name}.service unit:\n\
             # [Service]\n\
             # ExecStart={} project run {}\n",
            trident_bin.display(),
            project_path.display()
        ),
        ScheduleFormat::Launchd => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
             <plist version=\"1.0\"><dict>\n\
             \t<key>Label</key><string>com.trident.{name}</string>\n\
             \t<key>ProgramArguments</key><array>\n\
             \t\t<string>{}</string><string>project</string><string>run</string><string>{}</string>\n\
             \t</array>\n\
             \t<key>StartInterval</key><integer>3600</integer>\n\
             </dict></plist>\n",
            trident_bin.display(),
            project_path.display()
        ),
    };

    if show {
        print!("{rendered}");
    } else {
        let kind = match format {
            ScheduleFormat::Cron => "cron",
            ScheduleFormat::Systemd => "systemd timer",
            ScheduleFormat::Launchd => "launchd agent",
        };
        println!("{kind} unit ready for '{}' ({} project run {})", project_path.display(), trident_bin.display(), project_path.display());
        println!("pass --show to print the full unit");
    }
    Ok(0)
}
