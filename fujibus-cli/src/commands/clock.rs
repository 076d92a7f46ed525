use fujibus_core::devices::clock::{self, FormatCode};
use fujibus_core::{BusSession, ProtocolError, Transport};

use crate::cli::{ClockCommand, Opt};

pub fn dispatch<T: Transport>(session: &mut BusSession<T>, opt: &Opt, cmd: &ClockCommand) -> Result<(), ProtocolError> {
    match cmd {
        ClockCommand::Get => get(session, opt),
        ClockCommand::Set { unix_seconds } => set(session, opt, *unix_seconds),
        ClockCommand::GetFormat { format } => get_format(session, opt, format, None),
        ClockCommand::GetTz { tz, format } => get_format(session, opt, format, Some(tz)),
        ClockCommand::GetTimezone => get_timezone(session, opt),
        ClockCommand::SetTimezone { tz } => set_timezone(session, opt, tz),
        ClockCommand::SetTimezoneSave { tz } => set_timezone_save(session, opt, tz),
    }
}

fn get<T: Transport>(session: &mut BusSession<T>, opt: &Opt) -> Result<(), ProtocolError> {
    let unix_seconds = clock::get(session, opt.timeout_duration())?;
    println!("{} ({})", unix_seconds, clock::fmt_utc(unix_seconds));
    Ok(())
}

fn set<T: Transport>(session: &mut BusSession<T>, opt: &Opt, unix_seconds: u64) -> Result<(), ProtocolError> {
    let confirmed = clock::set(session, unix_seconds, opt.timeout_duration())?;
    println!("{} ({})", confirmed, clock::fmt_utc(confirmed));
    Ok(())
}

fn parse_format(name: &str) -> Result<FormatCode, ProtocolError> {
    match name.to_ascii_lowercase().as_str() {
        "simple" => Ok(FormatCode::Simple),
        "prodos" => Ok(FormatCode::ProDos),
        "apetime" => Ok(FormatCode::ApeTime),
        "tziso" => Ok(FormatCode::TzIso),
        "utciso" => Ok(FormatCode::UtcIso),
        "sos" => Ok(FormatCode::Sos),
        other => Err(ProtocolError::orchestration(format!(
            "unknown format `{}` (expected simple/prodos/apetime/tziso/utciso/sos)",
            other
        ))),
    }
}

fn get_format<T: Transport>(session: &mut BusSession<T>, opt: &Opt, format: &str, tz: Option<&str>) -> Result<(), ProtocolError> {
    let format = parse_format(format)?;
    let result = clock::get_format(session, format, tz, opt.timeout_duration())?;
    match format {
        FormatCode::TzIso | FormatCode::UtcIso => {
            println!("{}", String::from_utf8_lossy(&result.data));
        }
        _ => println!("{:02x?}", result.data),
    }
    Ok(())
}

fn get_timezone<T: Transport>(session: &mut BusSession<T>, opt: &Opt) -> Result<(), ProtocolError> {
    let tz = clock::get_timezone(session, opt.timeout_duration())?;
    println!("{}", tz);
    Ok(())
}

fn set_timezone<T: Transport>(session: &mut BusSession<T>, opt: &Opt, tz: &str) -> Result<(), ProtocolError> {
    let confirmed = clock::set_timezone(session, tz, opt.timeout_duration())?;
    println!("{}", confirmed);
    Ok(())
}

fn set_timezone_save<T: Transport>(session: &mut BusSession<T>, opt: &Opt, tz: &str) -> Result<(), ProtocolError> {
    let confirmed = clock::set_timezone_save(session, tz, opt.timeout_duration())?;
    println!("{}", confirmed);
    Ok(())
}
