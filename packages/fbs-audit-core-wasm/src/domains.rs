// Output store preparation and its coded-value domains
use crate::error::Result;
use crate::features::{CodedDomain, DomainKind};
use crate::store::FeatureStore;
use crate::test_points::{ExceptionCode, RiskClass, Status};

pub const STATUS_DOMAIN: &str = "PassFail";
pub const EXCEPTION_DOMAIN: &str = "Exception";
pub const RISK_CLASS_DOMAIN: &str = "RiskClass";
pub const TOLERANCE_DOMAIN: &str = "Tolerance";

pub fn status_domain() -> CodedDomain {
    CodedDomain {
        name: STATUS_DOMAIN.to_string(),
        description: "Pass/Fail".to_string(),
        kind: DomainKind::Text,
        codes: Status::ALL
            .iter()
            .map(|s| (s.code().to_string(), s.label().to_string()))
            .collect(),
    }
}

pub fn exception_domain() -> CodedDomain {
    CodedDomain {
        name: EXCEPTION_DOMAIN.to_string(),
        description: "Exception Type".to_string(),
        kind: DomainKind::Text,
        codes: ExceptionCode::ALL
            .iter()
            .map(|e| (e.code().to_string(), e.label()))
            .collect(),
    }
}

pub fn risk_class_domain() -> CodedDomain {
    CodedDomain {
        name: RISK_CLASS_DOMAIN.to_string(),
        description: "Risk Class".to_string(),
        kind: DomainKind::Text,
        codes: RiskClass::ALL
            .iter()
            .map(|r| (r.code().to_string(), r.code().to_string()))
            .collect(),
    }
}

pub fn tolerance_domain() -> CodedDomain {
    CodedDomain {
        name: TOLERANCE_DOMAIN.to_string(),
        description: "Tolerance".to_string(),
        kind: DomainKind::Float,
        codes: vec![
            ("1.0".to_string(), "1.0".to_string()),
            ("0.5".to_string(), "0.5".to_string()),
        ],
    }
}

/// Empty the output store and create the audit domains.
pub fn prepare_output(output: &dyn FeatureStore) -> Result<()> {
    crate::console_log!("Creating output store and domains");
    output.clear();
    for domain in [
        status_domain(),
        exception_domain(),
        risk_class_domain(),
        tolerance_domain(),
    ] {
        log::debug!("domain {} with {} codes", domain.name, domain.codes.len());
        output.create_domain(domain)?;
    }
    Ok(())
}
