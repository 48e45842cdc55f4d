//! Seeded banking entities: branches, users, accounts, deposit types,
//! standing orders and portal admins.
//!
//! Operations are plain functions over `DbState`, like the mock registry;
//! handlers hold the store lock around them. Read responses are enriched
//! with join fields (`branch_name`, `account_holder`, ...) resolved against
//! the sibling collections at serialization time.

use crate::error::{ApiError, FieldError};
use crate::model;
use crate::store::next_id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Physical bank branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub code: String,
    pub name: String,
    pub address: String,
    pub region: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    /// `active` or `inactive`; delete is a soft status flip.
    pub status: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Bank customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub customer_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub id_type: String,
    pub id_number: String,
    pub password: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub branch_id: String,
    #[serde(default)]
    pub kra_pin: Option<String>,
    /// `pending`, `verified` or `rejected`.
    pub kyc_status: String,
    pub status: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Customer account, either `withdrawable` (current/savings/cheque) or a
/// term `deposit`. The subtype and deposit fields only apply to their kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub account_number: String,
    pub user_id: String,
    pub branch_id: String,
    pub account_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_type_id: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_date: Option<String>,
    /// `active` or `closed`; delete closes.
    pub status: String,
    pub opened_date: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Term-deposit product definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositType {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub min_amount: f64,
    #[serde(default)]
    pub max_amount: Option<f64>,
    #[serde(default)]
    pub min_term_days: Option<u32>,
    #[serde(default)]
    pub max_term_days: Option<u32>,
    pub base_rate: f64,
    #[serde(default = "default_withholding")]
    pub withholding_tax_rate: f64,
    #[serde(default)]
    pub auto_renew_default: bool,
    pub status: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_withholding() -> f64 {
    15.0
}

/// Recurring payment instruction debiting a withdrawable account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingOrder {
    pub id: String,
    pub reference_number: String,
    pub user_id: String,
    pub debit_account_id: String,
    pub action: String,
    pub frequency: String,
    pub first_payment_date: String,
    #[serde(default)]
    pub regular_payment_date: Option<String>,
    #[serde(default)]
    pub last_payment_date: Option<String>,
    pub next_payment_date: String,
    pub currency: String,
    pub amount: f64,
    pub amount_words: String,
    pub remittance_mode: String,
    pub charge_type: String,
    #[serde(default)]
    pub details_of_payment: Option<String>,
    /// Free-form beneficiary details; only `name` is required.
    pub beneficiary: Value,
    /// `active` or `cancelled`; delete cancels.
    pub status: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<String>,
}

/// Portal administrator able to manage mocks and entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,
    pub name: String,
    pub username: String,
    pub password: String,
    pub role: String,
}

// ─── Creation / update payloads ─────────────────────────────────────────

/// Creation payload for `POST /v1/branches`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BranchSpec {
    pub name: Option<String>,
    pub code: Option<String>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub manager: Option<String>,
}

/// Field-allowlist update payload for `PUT /v1/branches/:id`.
/// The branch code is immutable.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BranchPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub manager: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UserSpec {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub id_type: Option<String>,
    pub id_number: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub branch_id: Option<String>,
    pub kra_pin: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub branch_id: Option<String>,
    pub kra_pin: Option<String>,
    pub kyc_status: Option<String>,
    pub status: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AccountSpec {
    pub user_id: Option<String>,
    pub branch_id: Option<String>,
    pub account_type: Option<String>,
    pub account_subtype: Option<String>,
    pub deposit_type_id: Option<String>,
    pub currency: Option<String>,
    pub balance: Option<f64>,
    pub principal: Option<f64>,
    pub rate: Option<f64>,
    pub term_days: Option<u32>,
    pub value_date: Option<String>,
    pub maturity_date: Option<String>,
    pub opened_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AccountPatch {
    pub balance: Option<f64>,
    pub principal: Option<f64>,
    pub rate: Option<f64>,
    pub term_days: Option<u32>,
    pub value_date: Option<String>,
    pub maturity_date: Option<String>,
    pub status: Option<String>,
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DepositTypeSpec {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub currency: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub min_term_days: Option<u32>,
    pub max_term_days: Option<u32>,
    pub base_rate: Option<f64>,
    pub withholding_tax_rate: Option<f64>,
    pub auto_renew_default: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DepositTypePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub min_term_days: Option<u32>,
    pub max_term_days: Option<u32>,
    pub base_rate: Option<f64>,
    pub withholding_tax_rate: Option<f64>,
    pub auto_renew_default: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StandingOrderSpec {
    pub user_id: Option<String>,
    pub debit_account_id: Option<String>,
    pub action: Option<String>,
    pub frequency: Option<String>,
    pub first_payment_date: Option<String>,
    pub regular_payment_date: Option<String>,
    pub last_payment_date: Option<String>,
    pub currency: Option<String>,
    pub amount: Option<f64>,
    pub amount_words: Option<String>,
    pub remittance_mode: Option<String>,
    pub charge_type: Option<String>,
    pub details_of_payment: Option<String>,
    pub beneficiary: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StandingOrderPatch {
    pub amount: Option<f64>,
    pub amount_words: Option<String>,
    pub frequency: Option<String>,
    pub last_payment_date: Option<String>,
    pub details_of_payment: Option<String>,
    pub beneficiary: Option<Value>,
    pub charge_type: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminSpec {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminPatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

// ─── Enrichment joins ───────────────────────────────────────────────────

use crate::store::DbState;

fn as_object<T: Serialize>(entity: &T) -> Map<String, Value> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn join(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

/// User with the branch name attached.
pub fn enrich_user(user: &User, db: &DbState) -> Value {
    let mut out = as_object(user);
    out.insert(
        "branch_name".into(),
        join(db.branches.get(&user.branch_id).map(|b| b.name.clone())),
    );
    Value::Object(out)
}

/// Account with holder, branch and deposit-product names attached.
pub fn enrich_account(account: &Account, db: &DbState) -> Value {
    let user = db.users.get(&account.user_id);
    let mut out = as_object(account);
    out.insert(
        "account_holder".into(),
        join(user.map(|u| format!("{} {}", u.first_name, u.last_name))),
    );
    out.insert(
        "customer_number".into(),
        join(user.map(|u| u.customer_number.clone())),
    );
    out.insert(
        "branch_name".into(),
        join(db.branches.get(&account.branch_id).map(|b| b.name.clone())),
    );
    out.insert(
        "deposit_type_name".into(),
        join(
            account
                .deposit_type_id
                .as_ref()
                .and_then(|id| db.deposit_types.get(id))
                .map(|d| d.name.clone()),
        ),
    );
    Value::Object(out)
}

/// Standing order with customer and debit-account details attached.
pub fn enrich_standing_order(order: &StandingOrder, db: &DbState) -> Value {
    let user = db.users.get(&order.user_id);
    let mut out = as_object(order);
    out.insert(
        "customer_name".into(),
        join(user.map(|u| format!("{} {}", u.first_name, u.last_name))),
    );
    out.insert(
        "customer_number".into(),
        join(user.map(|u| u.customer_number.clone())),
    );
    out.insert(
        "debit_account_number".into(),
        join(
            db.accounts
                .get(&order.debit_account_id)
                .map(|a| a.account_number.clone()),
        ),
    );
    Value::Object(out)
}

// ─── Validated operations ───────────────────────────────────────────────

fn required(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: Option<String>,
) -> Option<String> {
    match value {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors.push(FieldError {
                field,
                message: format!("{field} is required"),
            });
            None
        }
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::NotFound(format!("{what} not found"))
}

pub fn create_branch(db: &mut DbState, spec: BranchSpec) -> Result<Branch, ApiError> {
    let mut errors = Vec::new();
    let name = required(&mut errors, "name", spec.name);
    let code = required(&mut errors, "code", spec.code);
    let address = required(&mut errors, "address", spec.address);
    let region = required(&mut errors, "region", spec.region);
    let (Some(name), Some(code), Some(address), Some(region)) = (name, code, address, region)
    else {
        return Err(ApiError::FieldErrors(errors));
    };

    if db.branches.values().any(|b| b.code == code) {
        return Err(ApiError::Duplicate {
            code: "DUPLICATE_CODE",
            message: format!("Branch code {code} already exists"),
        });
    }

    let id = next_id(&db.branches, "br");
    let branch = Branch {
        id: id.clone(),
        code,
        name,
        address,
        region,
        phone: spec.phone,
        email: spec.email,
        manager: spec.manager,
        status: "active".to_string(),
        created_at: model::now(),
        updated_at: None,
    };
    db.branches.insert(id, branch.clone());
    Ok(branch)
}

pub fn update_branch(db: &mut DbState, id: &str, patch: BranchPatch) -> Result<Branch, ApiError> {
    let branch = db.branches.get_mut(id).ok_or_else(|| not_found("Branch"))?;
    if let Some(name) = patch.name {
        branch.name = name;
    }
    if let Some(address) = patch.address {
        branch.address = address;
    }
    if let Some(region) = patch.region {
        branch.region = region;
    }
    if let Some(phone) = patch.phone {
        branch.phone = Some(phone);
    }
    if let Some(email) = patch.email {
        branch.email = Some(email);
    }
    if let Some(manager) = patch.manager {
        branch.manager = Some(manager);
    }
    if let Some(status) = patch.status {
        branch.status = status;
    }
    branch.updated_at = Some(model::now());
    Ok(branch.clone())
}

pub fn deactivate_branch(db: &mut DbState, id: &str) -> Result<(), ApiError> {
    let branch = db.branches.get_mut(id).ok_or_else(|| not_found("Branch"))?;
    branch.status = "inactive".to_string();
    branch.updated_at = Some(model::now());
    Ok(())
}

pub fn create_user(db: &mut DbState, spec: UserSpec) -> Result<Value, ApiError> {
    let mut errors = Vec::new();
    let first_name = required(&mut errors, "first_name", spec.first_name);
    let last_name = required(&mut errors, "last_name", spec.last_name);
    let email = required(&mut errors, "email", spec.email);
    let phone = required(&mut errors, "phone", spec.phone);
    let id_type = required(&mut errors, "id_type", spec.id_type);
    let id_number = required(&mut errors, "id_number", spec.id_number);
    let branch_id = required(&mut errors, "branch_id", spec.branch_id);
    let (
        Some(first_name),
        Some(last_name),
        Some(email),
        Some(phone),
        Some(id_type),
        Some(id_number),
        Some(branch_id),
    ) = (first_name, last_name, email, phone, id_type, id_number, branch_id)
    else {
        return Err(ApiError::FieldErrors(errors));
    };

    if !db.branches.contains_key(&branch_id) {
        return Err(ApiError::Invalid {
            code: "INVALID_BRANCH",
            message: "Branch not found".to_string(),
        });
    }
    if db.users.values().any(|u| u.email == email) {
        return Err(ApiError::Duplicate {
            code: "DUPLICATE_EMAIL",
            message: "Email already registered".to_string(),
        });
    }
    if db.users.values().any(|u| u.id_number == id_number) {
        return Err(ApiError::Duplicate {
            code: "DUPLICATE_ID",
            message: "ID number already registered".to_string(),
        });
    }

    let id = next_id(&db.users, "usr");
    let user = User {
        customer_number: customer_number(&id),
        id: id.clone(),
        first_name,
        last_name,
        email,
        phone,
        id_type,
        id_number,
        password: spec.password.unwrap_or_else(|| "12345".to_string()),
        date_of_birth: spec.date_of_birth,
        gender: spec.gender,
        address: spec.address,
        branch_id,
        kra_pin: spec.kra_pin,
        kyc_status: "pending".to_string(),
        status: "active".to_string(),
        created_at: model::now(),
        updated_at: None,
    };
    let enriched = enrich_user(&user, db);
    db.users.insert(id, user);
    Ok(enriched)
}

/// Customer number derived from the user id sequence (`usr-0003` ⇒
/// `CIF-001003`), so numbers stay unique as long as ids do.
fn customer_number(user_id: &str) -> String {
    let seq: u32 = user_id
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    format!("CIF-{:06}", 1000 + seq)
}

pub fn update_user(db: &mut DbState, id: &str, patch: UserPatch) -> Result<Value, ApiError> {
    let user = db.users.get_mut(id).ok_or_else(|| not_found("User"))?;
    if let Some(first_name) = patch.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = patch.last_name {
        user.last_name = last_name;
    }
    if let Some(email) = patch.email {
        user.email = email;
    }
    if let Some(phone) = patch.phone {
        user.phone = phone;
    }
    if let Some(address) = patch.address {
        user.address = Some(address);
    }
    if let Some(branch_id) = patch.branch_id {
        user.branch_id = branch_id;
    }
    if let Some(kra_pin) = patch.kra_pin {
        user.kra_pin = Some(kra_pin);
    }
    if let Some(kyc_status) = patch.kyc_status {
        user.kyc_status = kyc_status;
    }
    if let Some(status) = patch.status {
        user.status = status;
    }
    if let Some(gender) = patch.gender {
        user.gender = Some(gender);
    }
    if let Some(date_of_birth) = patch.date_of_birth {
        user.date_of_birth = Some(date_of_birth);
    }
    if let Some(password) = patch.password {
        user.password = password;
    }
    user.updated_at = Some(model::now());
    let user = user.clone();
    Ok(enrich_user(&user, db))
}

pub fn deactivate_user(db: &mut DbState, id: &str) -> Result<(), ApiError> {
    let user = db.users.get_mut(id).ok_or_else(|| not_found("User"))?;
    user.status = "inactive".to_string();
    user.updated_at = Some(model::now());
    Ok(())
}

pub fn create_account(db: &mut DbState, spec: AccountSpec) -> Result<Value, ApiError> {
    let mut errors = Vec::new();
    let user_id = required(&mut errors, "user_id", spec.user_id);
    let account_type = match spec.account_type.as_deref() {
        Some(t) if !t.is_empty() => Some(t.to_string()),
        _ => {
            errors.push(FieldError {
                field: "account_type",
                message: "account_type is required: withdrawable | deposit".to_string(),
            });
            None
        }
    };
    let currency = required(&mut errors, "currency", spec.currency);
    if account_type.as_deref() == Some("withdrawable") && spec.account_subtype.is_none() {
        errors.push(FieldError {
            field: "account_subtype",
            message: "account_subtype required for withdrawable: current | savings | cheque"
                .to_string(),
        });
    }
    if account_type.as_deref() == Some("deposit") && spec.deposit_type_id.is_none() {
        errors.push(FieldError {
            field: "deposit_type_id",
            message: "deposit_type_id is required for deposit accounts".to_string(),
        });
    }
    let (Some(user_id), Some(account_type), Some(currency)) = (user_id, account_type, currency)
    else {
        return Err(ApiError::FieldErrors(errors));
    };
    if !errors.is_empty() {
        return Err(ApiError::FieldErrors(errors));
    }

    let Some(user) = db.users.get(&user_id) else {
        return Err(ApiError::Invalid {
            code: "INVALID_USER",
            message: "User not found".to_string(),
        });
    };
    if let Some(branch_id) = &spec.branch_id {
        if !db.branches.contains_key(branch_id) {
            return Err(ApiError::Invalid {
                code: "INVALID_BRANCH",
                message: "Branch not found".to_string(),
            });
        }
    }
    if let Some(deposit_type_id) = &spec.deposit_type_id {
        if !db.deposit_types.contains_key(deposit_type_id) {
            return Err(ApiError::Invalid {
                code: "INVALID_DEPOSIT_TYPE",
                message: "Deposit type not found".to_string(),
            });
        }
    }

    let branch_id = spec.branch_id.unwrap_or_else(|| user.branch_id.clone());
    let id = next_id(&db.accounts, "acc");
    let is_deposit = account_type == "deposit";

    let account = Account {
        id: id.clone(),
        account_number: account_number(&db.accounts, &account_type),
        user_id,
        branch_id,
        account_type,
        account_subtype: if is_deposit { None } else { spec.account_subtype },
        deposit_type_id: if is_deposit { spec.deposit_type_id } else { None },
        currency,
        balance: if is_deposit {
            spec.principal.unwrap_or(0.0)
        } else {
            spec.balance.unwrap_or(0.0)
        },
        principal: is_deposit.then(|| spec.principal.unwrap_or(0.0)),
        rate: if is_deposit { spec.rate } else { None },
        term_days: if is_deposit { spec.term_days } else { None },
        value_date: if is_deposit { spec.value_date } else { None },
        maturity_date: if is_deposit { spec.maturity_date } else { None },
        status: "active".to_string(),
        opened_date: spec
            .opened_date
            .unwrap_or_else(|| model::now()[..10].to_string()),
        created_at: model::now(),
        updated_at: None,
    };
    let enriched = enrich_account(&account, db);
    db.accounts.insert(id, account);
    Ok(enriched)
}

/// Account numbers are prefixed by kind (`1` withdrawable, `2` deposit)
/// and numbered within it. Accounts are closed, never removed, so the
/// per-kind count only grows.
fn account_number(accounts: &BTreeMap<String, Account>, account_type: &str) -> String {
    let prefix = if account_type == "deposit" { "2" } else { "1" };
    let existing = accounts
        .values()
        .filter(|a| a.account_type == account_type)
        .count();
    format!("{prefix}{:09}", existing + 1)
}

pub fn update_account(db: &mut DbState, id: &str, patch: AccountPatch) -> Result<Value, ApiError> {
    let account = db.accounts.get_mut(id).ok_or_else(|| not_found("Account"))?;
    if let Some(balance) = patch.balance {
        account.balance = balance;
    }
    if let Some(principal) = patch.principal {
        account.principal = Some(principal);
    }
    if let Some(rate) = patch.rate {
        account.rate = Some(rate);
    }
    if let Some(term_days) = patch.term_days {
        account.term_days = Some(term_days);
    }
    if let Some(value_date) = patch.value_date {
        account.value_date = Some(value_date);
    }
    if let Some(maturity_date) = patch.maturity_date {
        account.maturity_date = Some(maturity_date);
    }
    if let Some(status) = patch.status {
        account.status = status;
    }
    if let Some(branch_id) = patch.branch_id {
        account.branch_id = branch_id;
    }
    account.updated_at = Some(model::now());
    let account = account.clone();
    Ok(enrich_account(&account, db))
}

pub fn close_account(db: &mut DbState, id: &str) -> Result<(), ApiError> {
    let account = db.accounts.get_mut(id).ok_or_else(|| not_found("Account"))?;
    account.status = "closed".to_string();
    account.updated_at = Some(model::now());
    Ok(())
}

pub fn create_deposit_type(db: &mut DbState, spec: DepositTypeSpec) -> Result<DepositType, ApiError> {
    let mut errors = Vec::new();
    let code = required(&mut errors, "code", spec.code);
    let name = required(&mut errors, "name", spec.name);
    let currency = required(&mut errors, "currency", spec.currency);
    if spec.base_rate.is_none() {
        errors.push(FieldError {
            field: "base_rate",
            message: "Base rate (%) is required".to_string(),
        });
    }
    let (Some(code), Some(name), Some(currency), Some(base_rate)) =
        (code, name, currency, spec.base_rate)
    else {
        return Err(ApiError::FieldErrors(errors));
    };

    if db.deposit_types.values().any(|d| d.code == code) {
        return Err(ApiError::Duplicate {
            code: "DUPLICATE_CODE",
            message: format!("Code {code} already exists"),
        });
    }

    let id = next_id(&db.deposit_types, "dt");
    let deposit_type = DepositType {
        id: id.clone(),
        code,
        name,
        description: spec.description,
        currency,
        min_amount: spec.min_amount.unwrap_or(0.0),
        max_amount: spec.max_amount,
        min_term_days: spec.min_term_days,
        max_term_days: spec.max_term_days,
        base_rate,
        withholding_tax_rate: spec.withholding_tax_rate.unwrap_or(15.0),
        auto_renew_default: spec.auto_renew_default.unwrap_or(false),
        status: "active".to_string(),
        created_at: model::now(),
        updated_at: None,
    };
    db.deposit_types.insert(id, deposit_type.clone());
    Ok(deposit_type)
}

pub fn update_deposit_type(
    db: &mut DbState,
    id: &str,
    patch: DepositTypePatch,
) -> Result<DepositType, ApiError> {
    let deposit_type = db
        .deposit_types
        .get_mut(id)
        .ok_or_else(|| not_found("Deposit type"))?;
    if let Some(name) = patch.name {
        deposit_type.name = name;
    }
    if let Some(description) = patch.description {
        deposit_type.description = Some(description);
    }
    if let Some(min_amount) = patch.min_amount {
        deposit_type.min_amount = min_amount;
    }
    if let Some(max_amount) = patch.max_amount {
        deposit_type.max_amount = Some(max_amount);
    }
    if let Some(min_term_days) = patch.min_term_days {
        deposit_type.min_term_days = Some(min_term_days);
    }
    if let Some(max_term_days) = patch.max_term_days {
        deposit_type.max_term_days = Some(max_term_days);
    }
    if let Some(base_rate) = patch.base_rate {
        deposit_type.base_rate = base_rate;
    }
    if let Some(withholding_tax_rate) = patch.withholding_tax_rate {
        deposit_type.withholding_tax_rate = withholding_tax_rate;
    }
    if let Some(auto_renew_default) = patch.auto_renew_default {
        deposit_type.auto_renew_default = auto_renew_default;
    }
    if let Some(status) = patch.status {
        deposit_type.status = status;
    }
    deposit_type.updated_at = Some(model::now());
    Ok(deposit_type.clone())
}

pub fn deactivate_deposit_type(db: &mut DbState, id: &str) -> Result<(), ApiError> {
    let deposit_type = db
        .deposit_types
        .get_mut(id)
        .ok_or_else(|| not_found("Deposit type"))?;
    deposit_type.status = "inactive".to_string();
    deposit_type.updated_at = Some(model::now());
    Ok(())
}

pub fn create_standing_order(
    db: &mut DbState,
    spec: StandingOrderSpec,
) -> Result<Value, ApiError> {
    let mut errors = Vec::new();
    let user_id = required(&mut errors, "user_id", spec.user_id);
    let debit_account_id = required(&mut errors, "debit_account_id", spec.debit_account_id);
    let frequency = required(&mut errors, "frequency", spec.frequency);
    let first_payment_date = required(&mut errors, "first_payment_date", spec.first_payment_date);
    let currency = required(&mut errors, "currency", spec.currency);
    if spec.amount.is_none() {
        errors.push(FieldError {
            field: "amount",
            message: "amount is required".to_string(),
        });
    }
    let amount_words = required(&mut errors, "amount_words", spec.amount_words);
    let beneficiary_name_missing = spec
        .beneficiary
        .as_ref()
        .and_then(|b| b.get("name"))
        .and_then(Value::as_str)
        .map_or(true, str::is_empty);
    if beneficiary_name_missing {
        errors.push(FieldError {
            field: "beneficiary.name",
            message: "beneficiary name is required".to_string(),
        });
    }
    let (
        Some(user_id),
        Some(debit_account_id),
        Some(frequency),
        Some(first_payment_date),
        Some(currency),
        Some(amount),
        Some(amount_words),
        Some(beneficiary),
        false,
    ) = (
        user_id,
        debit_account_id,
        frequency,
        first_payment_date,
        currency,
        spec.amount,
        amount_words,
        spec.beneficiary,
        beneficiary_name_missing,
    )
    else {
        return Err(ApiError::FieldErrors(errors));
    };

    if !db.users.contains_key(&user_id) {
        return Err(ApiError::Invalid {
            code: "INVALID_USER",
            message: "User not found".to_string(),
        });
    }
    let Some(debit_account) = db.accounts.get(&debit_account_id) else {
        return Err(ApiError::Invalid {
            code: "INVALID_ACCOUNT",
            message: "Debit account not found".to_string(),
        });
    };
    if debit_account.user_id != user_id {
        return Err(ApiError::Invalid {
            code: "ACCOUNT_MISMATCH",
            message: "Account does not belong to user".to_string(),
        });
    }
    if debit_account.account_type != "withdrawable" {
        return Err(ApiError::Invalid {
            code: "WRONG_ACCOUNT_TYPE",
            message: "Standing orders must be linked to a withdrawable account".to_string(),
        });
    }

    let id = next_id(&db.standing_orders, "so");
    let order = StandingOrder {
        reference_number: order_reference(&id),
        id: id.clone(),
        user_id,
        debit_account_id,
        action: spec.action.unwrap_or_else(|| "new".to_string()),
        frequency,
        next_payment_date: first_payment_date.clone(),
        first_payment_date,
        regular_payment_date: spec.regular_payment_date,
        last_payment_date: spec.last_payment_date,
        currency,
        amount,
        amount_words,
        remittance_mode: spec
            .remittance_mode
            .unwrap_or_else(|| "telegraphic_transfer".to_string()),
        charge_type: spec.charge_type.unwrap_or_else(|| "SHA".to_string()),
        details_of_payment: spec.details_of_payment,
        beneficiary,
        status: "active".to_string(),
        created_at: model::now(),
        updated_at: None,
        cancelled_at: None,
    };
    let enriched = enrich_standing_order(&order, db);
    db.standing_orders.insert(id, order);
    Ok(enriched)
}

/// `so-0012` ⇒ `NCB/SO/<year>/0012`.
fn order_reference(id: &str) -> String {
    let seq = id.rsplit('-').next().unwrap_or("0000");
    format!("NCB/SO/{}/{seq}", chrono::Utc::now().format("%Y"))
}

pub fn amend_standing_order(
    db: &mut DbState,
    id: &str,
    patch: StandingOrderPatch,
) -> Result<Value, ApiError> {
    let order = db
        .standing_orders
        .get_mut(id)
        .ok_or_else(|| not_found("Standing order"))?;
    if order.status == "cancelled" {
        return Err(ApiError::Duplicate {
            code: "ALREADY_CANCELLED",
            message: "Cannot amend a cancelled order".to_string(),
        });
    }
    if let Some(amount) = patch.amount {
        order.amount = amount;
    }
    if let Some(amount_words) = patch.amount_words {
        order.amount_words = amount_words;
    }
    if let Some(frequency) = patch.frequency {
        order.frequency = frequency;
    }
    if let Some(last_payment_date) = patch.last_payment_date {
        order.last_payment_date = Some(last_payment_date);
    }
    if let Some(details_of_payment) = patch.details_of_payment {
        order.details_of_payment = Some(details_of_payment);
    }
    if let Some(beneficiary) = patch.beneficiary {
        order.beneficiary = beneficiary;
    }
    if let Some(charge_type) = patch.charge_type {
        order.charge_type = charge_type;
    }
    if let Some(status) = patch.status {
        order.status = status;
    }
    order.updated_at = Some(model::now());
    let order = order.clone();
    Ok(enrich_standing_order(&order, db))
}

pub fn cancel_standing_order(db: &mut DbState, id: &str) -> Result<StandingOrder, ApiError> {
    let order = db
        .standing_orders
        .get_mut(id)
        .ok_or_else(|| not_found("Standing order"))?;
    order.status = "cancelled".to_string();
    order.cancelled_at = Some(model::now());
    Ok(order.clone())
}

pub fn create_admin(db: &mut DbState, spec: AdminSpec) -> Result<Admin, ApiError> {
    let (Some(name), Some(username), Some(password)) = (spec.name, spec.username, spec.password)
    else {
        return Err(ApiError::Validation(
            "name, username, and password required".to_string(),
        ));
    };

    if db.admins.values().any(|a| a.username == username) {
        return Err(ApiError::Duplicate {
            code: "DUPLICATE_USERNAME",
            message: "Username already exists".to_string(),
        });
    }

    let id = next_id(&db.admins, "adm");
    let admin = Admin {
        id: id.clone(),
        name,
        username,
        password,
        role: spec.role.unwrap_or_else(|| "admin".to_string()),
    };
    db.admins.insert(id, admin.clone());
    Ok(admin)
}

pub fn update_admin(db: &mut DbState, id: &str, patch: AdminPatch) -> Result<Admin, ApiError> {
    let admin = db.admins.get_mut(id).ok_or_else(|| not_found("Admin"))?;
    if let Some(name) = patch.name {
        admin.name = name;
    }
    if let Some(username) = patch.username {
        admin.username = username;
    }
    if let Some(password) = patch.password {
        admin.password = password;
    }
    if let Some(role) = patch.role {
        admin.role = role;
    }
    Ok(admin.clone())
}

/// Admins are hard-deleted, unlike the soft-deleted customer entities.
pub fn delete_admin(db: &mut DbState, id: &str) -> Result<(), ApiError> {
    db.admins
        .remove(id)
        .map(|_| ())
        .ok_or_else(|| not_found("Admin"))
}
